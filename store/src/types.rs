use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Per-item learning progress.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LearningStatus {
    #[default]
    Unlearned,
    Learned,
    Mastered,
}

impl LearningStatus {
    /// Next state in the fixed cycle `unlearned -> learned -> mastered -> unlearned`.
    pub fn next(self) -> Self {
        match self {
            LearningStatus::Unlearned => LearningStatus::Learned,
            LearningStatus::Learned => LearningStatus::Mastered,
            LearningStatus::Mastered => LearningStatus::Unlearned,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LearningStatus::Unlearned => "unlearned",
            LearningStatus::Learned => "learned",
            LearningStatus::Mastered => "mastered",
        }
    }
}

impl std::fmt::Display for LearningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-map status record, always written as one unit.
pub type StatusSnapshot = BTreeMap<String, LearningStatus>;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub time: i64,
    #[serde(default)]
    pub imported: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, time: i64) -> Self {
        Self {
            role,
            content: content.into(),
            time,
            imported: false,
        }
    }
}

/// Transcript of one item, ascending by `time`.
pub type ConversationHistory = Vec<ChatMessage>;

/// Portable transcript document used both for user exports and for
/// snapshot files in the folder store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub object_id: String,
    #[serde(default)]
    pub object_title: String,
    #[serde(default)]
    pub object_type: String,
    pub export_time: i64,
    #[serde(default)]
    pub export_time_string: String,
    pub messages: Vec<ExportMessage>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportMessage {
    pub role: Role,
    pub content: String,
    pub time: i64,
    #[serde(default)]
    pub time_string: String,
}

/// Listing entry for one history snapshot file.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub filename: String,
    pub message_count: usize,
    /// Epoch milliseconds.
    pub saved_at: i64,
}
