//! Model invocation with output-schema enforcement.
//!
//! One `invoke` is one model turn: the declared schema and tools go out, and
//! what comes back is either an answer that already conforms to the schema or
//! a list of tool requests. Transient failures are retried per `RetryPolicy`;
//! a non-conforming answer is never retried.

use serde_json::{Map, Value};

use super::schema::ResponseSchema;
use super::tools::ToolDeclaration;
use super::PipelineError;
use crate::llm::{
    ChatMessage, ChatRequest, ModelBackend, ModelReply, PcmAudio, RetryPolicy, ToolInvocation,
};

/// Result of one model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Schema-conforming answer, declared fields only.
    Answer(Map<String, Value>),
    ToolCalls(Vec<ToolInvocation>),
}

pub struct ModelInvoker<B> {
    backend: B,
    retry: RetryPolicy,
}

impl<B: ModelBackend> ModelInvoker<B> {
    pub fn new(backend: B, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub async fn invoke(
        &self,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
        tools: &[ToolDeclaration],
    ) -> Result<Invocation, PipelineError> {
        let mut request = ChatRequest::new(messages.to_vec());
        request.output = Some(schema.output_format());
        request.tools = tools.iter().map(ToolDeclaration::spec).collect();

        tracing::debug!(
            backend = self.backend.name(),
            schema = schema.name,
            tools = request.tools.len(),
            turns = request.messages.len(),
            "Invoking model"
        );

        let backend = &self.backend;
        let request = &request;
        let reply = self
            .retry
            .run("chat", move || backend.chat(request))
            .await?;

        match reply {
            ModelReply::ToolCalls(_) if tools.is_empty() => Err(PipelineError::SchemaMismatch(
                "model requested a tool but none were declared".into(),
            )),
            ModelReply::ToolCalls(calls) if calls.is_empty() => Err(PipelineError::SchemaMismatch(
                "model sent an empty tool request".into(),
            )),
            ModelReply::ToolCalls(calls) => Ok(Invocation::ToolCalls(calls)),
            ModelReply::Text(text) => {
                let value = extract_json(&text)?;
                let answer = schema.conform(&value)?;
                Ok(Invocation::Answer(answer))
            }
        }
    }

    /// Synthesize speech for `text`.
    pub async fn speak(&self, text: &str) -> Result<PcmAudio, PipelineError> {
        let backend = &self.backend;
        let audio = self
            .retry
            .run("speech", move || backend.synthesize_speech(text))
            .await?;
        if audio.data.is_empty() {
            return Err(PipelineError::SchemaMismatch("speech response carried no audio".into()));
        }
        Ok(audio)
    }
}

/// Pull the JSON object out of a model reply.
///
/// Accepts a bare object, a ```json fenced block, or an object surrounded by
/// prose (first `{` to last `}`).
pub fn extract_json(text: &str) -> Result<Value, PipelineError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str::<Value>(body[..end].trim()) {
                return Ok(value);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| PipelineError::SchemaMismatch(format!("model reply is not valid JSON: {e}"))),
        _ => Err(PipelineError::SchemaMismatch(
            "model reply contains no JSON object".into(),
        )),
    }
}
