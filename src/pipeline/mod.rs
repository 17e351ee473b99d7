//! Structured AI request pipeline.
//!
//! validate → render prompt → invoke model → (tool loop) → normalize, strictly
//! in that order for every feature. `assistant` is the caller-facing surface.

pub mod assistant;
pub mod invoke;
pub mod normalize;
pub mod prompt;
pub mod request;
pub mod schema;
pub mod speech;
pub mod tool_loop;
pub mod tools;
pub mod validation;

pub use assistant::{Envelope, HealthAssistant};
pub use normalize::*;
pub use request::*;
pub use validation::{FieldIssue, ValidationError};

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Model answer does not match the declared schema: {0}")]
    SchemaMismatch(String),

    #[error("Model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transient(_) => "transient",
            Self::SchemaMismatch(_) => "schema_mismatch",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        if err.is_transient() {
            return Self::Transient(err.to_string());
        }
        match err {
            LlmError::MalformedResponse(msg) => Self::SchemaMismatch(msg),
            other => Self::ServiceUnavailable(other.to_string()),
        }
    }
}
