//! Remote chat: request context, HTTP transport and the retry policy.

pub mod client;
pub mod context;
pub mod transport;

pub use client::ChatOutcome;
pub use client::ChatSurface;
pub use client::RetryPolicy;
pub use client::RetryingClient;
pub use transport::AttemptFailure;
pub use transport::ChatRequest;
pub use transport::ChatTransport;
pub use transport::FailureClass;
pub use transport::HttpChatTransport;
pub use transport::WireMessage;
pub use transport::classify;
