//! Terminal implementations of the front-end seams.

use std::io::BufRead as _;
use std::io::Write as _;
use std::path::PathBuf;

use lectern_core::ChatError;
use lectern_core::chat::ChatSurface;
use lectern_store::FolderPicker;

/// Prints the reply on stdout and progress on stderr.
#[derive(Debug, Default)]
pub struct TerminalSurface {
    attempts: u32,
}

impl ChatSurface for TerminalSurface {
    fn record_outbound(&mut self, text: &str) {
        eprintln!("> {text}");
    }

    fn clear_input(&mut self) {}

    fn show_waiting(&mut self) {
        self.attempts += 1;
        if self.attempts == 1 {
            eprintln!("thinking...");
        } else {
            eprintln!("thinking... (attempt {})", self.attempts);
        }
    }

    fn hide_waiting(&mut self) {}

    fn append_reply(&mut self, text: &str) {
        println!("{text}");
    }

    fn show_error(&mut self, error: &ChatError) {
        eprintln!("error: {error}");
    }
}

/// The folder passed on the command line stands in for an interactive picker.
pub struct ArgPicker(pub Option<PathBuf>);

impl FolderPicker for ArgPicker {
    fn pick(&self) -> anyhow::Result<Option<PathBuf>> {
        Ok(self.0.clone())
    }
}

/// Ask a yes/no question on stderr and read the answer from stdin.
/// Anything but `y`/`yes`, including end of input, is a no.
pub fn confirm(question: &str) -> bool {
    eprint!("{question} [y/N] ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
