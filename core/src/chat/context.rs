//! Builds the message list sent with each question.

use std::path::PathBuf;

use lectern_store::types::ChatMessage;

use crate::chat::transport::WireMessage;
use crate::outline::OutlineItem;

const SYSTEM_PROMPT: &str = "You are a patient mathematics tutor helping a reader work through a \
textbook. Explain concepts step by step, use LaTeX for formulas ($...$ inline, $$...$$ for \
display), connect new material to what the reader has already learned, and suggest small \
exercises to check understanding.";

/// Extracted text for a range of document pages.
pub trait PageTextSource {
    /// Text of pages `start..=end`. Pages that do not exist contribute nothing.
    fn pages_text(&self, start: u32, end: u32) -> anyhow::Result<String>;
}

/// No page text available.
pub struct NoPages;

impl PageTextSource for NoPages {
    fn pages_text(&self, _start: u32, _end: u32) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// A directory holding one `page-<n>.txt` file per page.
pub struct PageDir {
    dir: PathBuf,
}

impl PageDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PageTextSource for PageDir {
    fn pages_text(&self, start: u32, end: u32) -> anyhow::Result<String> {
        let mut pages = Vec::new();
        for n in start..=end {
            match std::fs::read_to_string(self.dir.join(format!("page-{n}.txt"))) {
                Ok(text) => pages.push(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pages.join("\n\n"))
    }
}

pub struct ContextLimits {
    pub history_window: usize,
    pub page_chars: usize,
}

/// System prompt with item context, then the most recent history, then the
/// new question.
pub fn build_messages(
    limits: &ContextLimits,
    item: Option<&OutlineItem>,
    pages: &dyn PageTextSource,
    learned: &[&str],
    history: &[ChatMessage],
    question: &str,
) -> Vec<WireMessage> {
    let mut system = SYSTEM_PROMPT.to_string();

    if let Some(item) = item {
        system.push_str(&format!(
            "\n\nThe reader is studying {} {}: {}",
            item.kind, item.id, item.title
        ));
        if let Some(page) = item.page {
            system.push_str(&format!(" (page {page})."));
            match pages.pages_text(page, page.saturating_add(1)) {
                Ok(text) if !text.trim().is_empty() => {
                    system.push_str("\n\nText of the current pages:\n");
                    system.push_str(&truncate_chars(&text, limits.page_chars));
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("chat: page text unavailable for page {page}: {e}"),
            }
        } else {
            system.push('.');
        }
    }

    if !learned.is_empty() {
        system.push_str("\n\nItems the reader has already learned: ");
        system.push_str(&learned.join(", "));
    }

    let mut messages = vec![WireMessage::new("system", system)];
    let skip = history.len().saturating_sub(limits.history_window);
    messages.extend(
        history[skip..]
            .iter()
            .map(|m| WireMessage::new(m.role.as_str(), m.content.clone())),
    );
    messages.push(WireMessage::new("user", question));
    messages
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
