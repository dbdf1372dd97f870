#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use lectern_core::ChatError;
use lectern_core::chat::AttemptFailure;
use lectern_core::chat::ChatRequest;
use lectern_core::chat::ChatSurface;
use lectern_core::chat::ChatTransport;
use tokio_util::sync::CancellationToken;

pub fn overloaded() -> AttemptFailure {
    AttemptFailure::Api {
        status: Some(429),
        code: Some("engine_overloaded_error".into()),
        message: "engine is overloaded".into(),
    }
}

pub fn unauthorized() -> AttemptFailure {
    AttemptFailure::Api {
        status: Some(401),
        code: Some("invalid_authentication_error".into()),
        message: "bad key".into(),
    }
}

pub fn reset() -> AttemptFailure {
    AttemptFailure::Transport {
        message: "connection reset".into(),
    }
}

/// Plays back a fixed list of results, then keeps answering `fallback`.
pub struct Scripted {
    script: Mutex<VecDeque<Result<String, AttemptFailure>>>,
    fallback: Result<String, AttemptFailure>,
    calls: AtomicU32,
    requests: Mutex<Vec<ChatRequest>>,
    cancel_on_call: Option<CancellationToken>,
}

impl Scripted {
    pub fn new(script: Vec<Result<String, AttemptFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Err(overloaded()),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    pub fn always(result: Result<String, AttemptFailure>) -> Self {
        let mut s = Self::new(Vec::new());
        s.fallback = result;
        s
    }

    /// Cancel `token` as soon as the first attempt is made.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl ChatTransport for Scripted {
    fn send(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<String, AttemptFailure>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        std::future::ready(next)
    }
}

/// Counts every user-visible effect.
#[derive(Debug, Default)]
pub struct Recorder {
    pub outbound: Vec<String>,
    pub cleared: u32,
    pub shown: u32,
    pub hidden: u32,
    pub replies: Vec<String>,
    pub errors: Vec<String>,
}

impl ChatSurface for Recorder {
    fn record_outbound(&mut self, text: &str) {
        self.outbound.push(text.to_string());
    }
    fn clear_input(&mut self) {
        self.cleared += 1;
    }
    fn show_waiting(&mut self) {
        self.shown += 1;
    }
    fn hide_waiting(&mut self) {
        self.hidden += 1;
    }
    fn append_reply(&mut self, text: &str) {
        self.replies.push(text.to_string());
    }
    fn show_error(&mut self, error: &ChatError) {
        self.errors.push(error.to_string());
    }
}
