use std::collections::VecDeque;
use std::sync::Mutex;

use super::{ChatRequest, LlmError, ModelBackend, ModelReply, PcmAudio};

/// Deterministic backend that replays queued replies and records every
/// request it receives.
///
/// Used by tests and offline embedding. When the queue is empty
/// the `fallback` reply (if any) is returned; otherwise the call fails.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    fallback: Option<ModelReply>,
    speech: Mutex<VecDeque<Result<PcmAudio, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    speech_requests: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every chat call with the same reply.
    pub fn repeating(reply: ModelReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// Queue a plain-text (JSON) answer.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_reply(Ok(ModelReply::Text(text.into())))
    }

    pub fn with_reply(self, reply: Result<ModelReply, LlmError>) -> Self {
        if let Ok(mut queue) = self.replies.lock() {
            queue.push_back(reply);
        }
        self
    }

    pub fn with_speech(self, audio: Result<PcmAudio, LlmError>) -> Self {
        if let Ok(mut queue) = self.speech.lock() {
            queue.push_back(audio);
        }
        self
    }

    /// Number of chat round-trips made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Snapshot of every chat request received, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn speech_requests(&self) -> Vec<String> {
        self.speech_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ModelReply, LlmError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(LlmError::MalformedResponse(
                "scripted backend has no reply queued".into(),
            )),
        }
    }

    async fn synthesize_speech(&self, text: &str) -> Result<PcmAudio, LlmError> {
        if let Ok(mut seen) = self.speech_requests.lock() {
            seen.push(text.to_string());
        }
        self.speech
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(LlmError::Unsupported("Text-to-speech".into())))
    }
}
