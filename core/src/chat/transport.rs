//! Chat-completions wire format and one-shot transport.

use std::future::Future;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Why a single attempt produced no reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The endpoint answered, but with an error.
    Api {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
    /// No usable response: connect, reset, timeout or unreadable body.
    Transport { message: String },
}

impl AttemptFailure {
    pub fn message(&self) -> &str {
        match self {
            AttemptFailure::Api { message, .. } | AttemptFailure::Transport { message } => message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Overloaded or rate limited; worth waiting for.
    Overloaded,
    /// Network-level failure; worth a shorter retry budget.
    Transport,
    /// Credential rejected. Never retried.
    Unauthorized,
    /// Account quota exhausted. Never retried.
    QuotaExhausted,
    /// Anything else. Reported immediately.
    Other,
}

const AUTH_CODES: &[&str] = &["invalid_authentication_error", "invalid_api_key"];
const QUOTA_CODES: &[&str] = &["exceeded_current_quota_error", "insufficient_quota"];
const OVERLOAD_CODES: &[&str] = &["engine_overloaded_error", "rate_limit_reached_error"];

pub fn classify(failure: &AttemptFailure) -> FailureClass {
    let (status, code) = match failure {
        AttemptFailure::Transport { .. } => return FailureClass::Transport,
        AttemptFailure::Api { status, code, .. } => (*status, code.as_deref().unwrap_or_default()),
    };
    // Quota is checked before 429 because some providers report it with 429.
    if status == Some(401) || AUTH_CODES.contains(&code) {
        FailureClass::Unauthorized
    } else if QUOTA_CODES.contains(&code) {
        FailureClass::QuotaExhausted
    } else if OVERLOAD_CODES.contains(&code) || matches!(status, Some(429 | 500..=599)) {
        FailureClass::Overloaded
    } else {
        FailureClass::Other
    }
}

/// A single request/response exchange with the chat endpoint.
pub trait ChatTransport {
    fn send(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<String, AttemptFailure>> + Send;
}

/// Bearer-authenticated POST to an OpenAI-style chat completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpChatTransport {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl ChatTransport for HttpChatTransport {
    async fn send(&self, request: &ChatRequest) -> Result<String, AttemptFailure> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptFailure::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AttemptFailure::Transport {
            message: format!("reading response body: {e}"),
        })?;
        parse_response(status.as_u16(), status.is_success(), &body)
    }
}

fn parse_response(status: u16, success: bool, body: &str) -> Result<String, AttemptFailure> {
    let json: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        let code = ["code", "type"]
            .iter()
            .find_map(|k| error.get(*k).and_then(Value::as_str))
            .map(str::to_string);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(AttemptFailure::Api {
            status: Some(status),
            code,
            message,
        });
    }

    if !success {
        return Err(AttemptFailure::Api {
            status: Some(status),
            code: None,
            message: format!("HTTP {status}: {}", body.trim()),
        });
    }

    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AttemptFailure::Api {
            status: Some(status),
            code: None,
            message: "response has no message content".to_string(),
        })
}
