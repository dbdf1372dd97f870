//! Reading-companion state: learning status, per-item chat transcripts and
//! the retrying chat client, layered over `lectern-store`.

pub mod chat;
pub mod companion;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod keys;
pub mod migrate;
pub mod outline;
pub mod status;

pub use companion::Companion;
pub use companion::ImportOutcome;
pub use companion::Stores;
pub use config::Config;
pub use error::ChatError;
pub use error::ImportError;
pub use history::HistoryStore;
pub use status::StatusTracker;
