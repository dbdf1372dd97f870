//! Per-item conversation transcripts and the deduplicating merge.

use std::collections::BTreeMap;
use std::collections::HashSet;

use lectern_store::Ack;
use lectern_store::types::ChatMessage;
use lectern_store::types::ConversationHistory;
use lectern_store::types::Role;

use crate::companion::Stores;
use crate::keys;

/// Identity of a message for deduplication.
type MessageKey = (i64, Role, String);

fn key_of(m: &ChatMessage) -> MessageKey {
    (m.time, m.role, m.content.clone())
}

/// Every item's transcript, persisted as one document.
#[derive(Debug, Default)]
pub struct HistoryStore {
    histories: BTreeMap<String, ConversationHistory>,
}

impl HistoryStore {
    /// Replace the in-memory cache with what the key/value store holds.
    pub fn load_all(&mut self, stores: &Stores) -> &BTreeMap<String, ConversationHistory> {
        self.histories = stores
            .kv
            .get_as::<BTreeMap<String, ConversationHistory>>(keys::CHAT_HISTORY)
            .unwrap_or_default();
        &self.histories
    }

    pub fn load(&self, item_id: &str) -> ConversationHistory {
        self.messages(item_id).to_vec()
    }

    pub fn messages(&self, item_id: &str) -> &[ChatMessage] {
        self.histories
            .get(item_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// A timestamp for a new message in `item_id` that keeps the transcript
    /// strictly increasing even when the clock has not moved.
    pub fn stamp(&self, item_id: &str, now_ms: i64) -> i64 {
        match self.messages(item_id).last() {
            Some(last) if last.time >= now_ms => last.time + 1,
            _ => now_ms,
        }
    }

    pub fn append(&mut self, stores: &Stores, item_id: &str, message: ChatMessage) -> Ack {
        push_ordered(self.histories.entry(item_id.to_string()).or_default(), message);
        self.persist(stores)
    }

    /// Record one question and its answer, persisting once.
    pub fn record_exchange(
        &mut self,
        stores: &Stores,
        item_id: &str,
        user: ChatMessage,
        reply: ChatMessage,
    ) -> Ack {
        let history = self.histories.entry(item_id.to_string()).or_default();
        push_ordered(history, user);
        push_ordered(history, reply);
        self.persist(stores)
    }

    /// Merge messages from an export or snapshot. Messages already present
    /// (same time, role and content) are skipped, as are repeats inside
    /// `incoming`. New ones are marked imported. Returns how many were added.
    pub fn merge_external(
        &mut self,
        stores: &Stores,
        item_id: &str,
        incoming: impl IntoIterator<Item = ChatMessage>,
    ) -> usize {
        let history = self.histories.entry(item_id.to_string()).or_default();
        let mut seen: HashSet<MessageKey> = history.iter().map(key_of).collect();
        let mut added = 0;
        for mut message in incoming {
            if !seen.insert(key_of(&message)) {
                continue;
            }
            message.imported = true;
            history.push(message);
            added += 1;
        }
        if added > 0 {
            history.sort_by_key(|m| m.time);
            self.persist(stores);
        }
        added
    }

    fn persist(&self, stores: &Stores) -> Ack {
        stores.kv.set_as(keys::CHAT_HISTORY, &self.histories)
    }
}

fn push_ordered(history: &mut ConversationHistory, message: ChatMessage) {
    let out_of_order = history.last().is_some_and(|last| last.time > message.time);
    history.push(message);
    if out_of_order {
        history.sort_by_key(|m| m.time);
    }
}
