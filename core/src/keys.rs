//! Key/value keys shared by every component.

pub const LEARNING_STATUS: &str = "lectern_learning_status";
pub const CHAT_HISTORY: &str = "lectern_chat_history";
pub const API_KEY: &str = "lectern_api_key";
pub const LAST_PAGE: &str = "lectern_last_page";
pub const FOLDER_META: &str = "lectern_folder_meta";
/// Flat id list written by releases that only knew a learned/not-learned flag.
pub const LEGACY_LEARNED: &str = "lectern_learned";
