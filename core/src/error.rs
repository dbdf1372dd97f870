use thiserror::Error;

/// Terminal outcome of a chat request chain.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key configured; run `lectern key set <KEY>` first")]
    MissingCredential,

    #[error("message is empty")]
    EmptyMessage,

    /// HTTP 401 or an authentication error code.
    #[error("the API key was rejected: {0}")]
    Unauthorized(String),

    #[error("the account quota is exhausted: {0}")]
    QuotaExhausted(String),

    /// Overload or transport failures outlasted the retry budget.
    #[error("the service is still unavailable after {retries} retries: {message}")]
    RetriesExhausted { retries: u32, message: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Reasons an export document is rejected before anything is merged.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("missing version")]
    MissingVersion,

    #[error("missing objectId")]
    MissingObjectId,

    #[error("messages must be an array")]
    MissingMessages,

    #[error("message {index} is invalid: {reason}")]
    InvalidMessage { index: usize, reason: String },
}
