//! Bounded retries with exponential backoff around a [`ChatTransport`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::chat::transport::AttemptFailure;
use crate::chat::transport::ChatRequest;
use crate::chat::transport::ChatTransport;
use crate::chat::transport::FailureClass;
use crate::chat::transport::classify;
use crate::error::ChatError;

/// Front-end effects of a request chain. Each hook fires exactly as
/// documented regardless of how many attempts the chain takes.
pub trait ChatSurface {
    /// Once, before the first attempt.
    fn record_outbound(&mut self, text: &str);
    /// Once, before the first attempt.
    fn clear_input(&mut self);
    /// Before every attempt.
    fn show_waiting(&mut self);
    /// After every attempt.
    fn hide_waiting(&mut self);
    /// Once, when the chain succeeds.
    fn append_reply(&mut self, text: &str);
    /// Once, when the chain fails for a reason other than cancellation.
    fn show_error(&mut self, error: &ChatError);
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed for overload and rate-limit responses.
    pub overload_retries: u32,
    /// Retries allowed for transport failures.
    pub transport_retries: u32,
    /// Delay before the first retry; doubles for each later one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            overload_retries: 3,
            transport_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `n` (1-based): `base * 2^(n-1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }

    fn budget(&self, class: FailureClass) -> u32 {
        match class {
            FailureClass::Overloaded => self.overload_retries,
            FailureClass::Transport => self.transport_retries,
            FailureClass::Unauthorized | FailureClass::QuotaExhausted | FailureClass::Other => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub reply: String,
    pub attempts: u32,
    /// Backoff waited before each retry, in order.
    pub delays: Vec<Duration>,
}

pub struct RetryingClient<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: ChatTransport> RetryingClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one request chain: send, and on a retryable failure wait and send
    /// again until the reply arrives, the budget runs out or `cancel` fires.
    pub async fn send(
        &self,
        request: &ChatRequest,
        outbound: &str,
        surface: &mut dyn ChatSurface,
        cancel: &CancellationToken,
    ) -> Result<ChatOutcome, ChatError> {
        surface.record_outbound(outbound);
        surface.clear_input();

        let mut retries = 0u32;
        let mut delays = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(ChatError::Cancelled);
            }

            surface.show_waiting();
            let result = self.transport.send(request).await;
            surface.hide_waiting();

            let failure = match result {
                Ok(reply) => {
                    surface.append_reply(&reply);
                    return Ok(ChatOutcome {
                        reply,
                        attempts: retries + 1,
                        delays,
                    });
                }
                Err(failure) => failure,
            };

            let class = classify(&failure);
            if retries >= self.policy.budget(class) {
                let error = into_error(class, failure, retries);
                surface.show_error(&error);
                return Err(error);
            }

            retries += 1;
            let delay = self.policy.delay(retries);
            tracing::info!(
                "chat: attempt {retries} failed ({class:?}: {}), retrying in {delay:?}",
                failure.message()
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delays.push(delay);
        }
    }
}

fn into_error(class: FailureClass, failure: AttemptFailure, retries: u32) -> ChatError {
    let message = match failure {
        AttemptFailure::Api { message, .. } | AttemptFailure::Transport { message } => message,
    };
    match class {
        FailureClass::Unauthorized => ChatError::Unauthorized(message),
        FailureClass::QuotaExhausted => ChatError::QuotaExhausted(message),
        FailureClass::Overloaded | FailureClass::Transport => {
            ChatError::RetriesExhausted { retries, message }
        }
        FailureClass::Other => ChatError::Request(message),
    }
}
