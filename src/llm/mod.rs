//! Model service boundary.
//!
//! `ModelBackend` is the one seam every generative-model vendor sits behind:
//! a chat call that either answers with text or asks for tool calls, and a
//! speech-synthesis call. Retries, schema enforcement and tool execution live
//! above this layer in `pipeline`.

pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod retry;
pub mod types;

pub use gemini::GeminiBackend;
pub use mock::ScriptedBackend;
pub use ollama::OllamaBackend;
pub use retry::RetryPolicy;
pub use types::*;

use std::future::Future;

/// Error taxonomy for model-service calls.
///
/// Messages are written for logs; the caller-facing wording is chosen in
/// `pipeline::assistant`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("Model service is not reachable at {0}")]
    NotReachable(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Model service returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Model service rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Model service quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Model '{0}' is not installed")]
    ModelNotFound(String),

    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),

    #[error("Only localhost connections are allowed for the local model service")]
    NonLocalEndpoint,

    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("{0} is not supported by this model backend")]
    Unsupported(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl LlmError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotReachable(_) | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Classify an HTTP failure status.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(message),
            429 => Self::QuotaExceeded(message),
            _ => Self::ApiError { status, message },
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_reqwest(err: &reqwest::Error, base_url: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_connect() {
            Self::NotReachable(base_url.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// A generative-model vendor.
pub trait ModelBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// One model round-trip.
    fn chat(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ModelReply, LlmError>> + Send;

    /// Render `text` as speech.
    fn synthesize_speech(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<PcmAudio, LlmError>> + Send;
}

/// Runtime-selected backend.
pub enum AnyBackend {
    Ollama(OllamaBackend),
    Gemini(GeminiBackend),
}

impl ModelBackend for AnyBackend {
    fn name(&self) -> &str {
        match self {
            Self::Ollama(b) => b.name(),
            Self::Gemini(b) => b.name(),
        }
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ModelReply, LlmError> {
        match self {
            Self::Ollama(b) => b.chat(request).await,
            Self::Gemini(b) => b.chat(request).await,
        }
    }

    async fn synthesize_speech(&self, text: &str) -> Result<PcmAudio, LlmError> {
        match self {
            Self::Ollama(b) => b.synthesize_speech(text).await,
            Self::Gemini(b) => b.synthesize_speech(text).await,
        }
    }
}

impl<T: ModelBackend> ModelBackend for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn chat(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ModelReply, LlmError>> + Send {
        (**self).chat(request)
    }

    fn synthesize_speech(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<PcmAudio, LlmError>> + Send {
        (**self).synthesize_speech(text)
    }
}
