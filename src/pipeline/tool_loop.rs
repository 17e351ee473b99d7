//! Tool-call loop.
//!
//! ```text
//! AwaitingModel ──answer──▶ FinalAnswer
//!      │
//!   tool request
//!      ▼
//! ToolRequested ─▶ ToolExecuting (per call) ─▶ ToolResultReturned ─▶ AwaitingModel
//! ```
//!
//! Tool calls are executed sequentially since the next model turn needs their
//! results. The loop is bounded by [`MAX_MODEL_TURNS`].

use serde_json::{Map, Value};

use super::invoke::{Invocation, ModelInvoker};
use super::schema::ResponseSchema;
use super::tools::{execute, ToolCall, ToolDeclaration, ToolOutput};
use super::PipelineError;
use crate::directory::DoctorDirectory;
use crate::llm::{ChatMessage, ModelBackend};

/// Upper bound on model round-trips for one request.
pub const MAX_MODEL_TURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ToolRequested,
    ToolExecuting,
    ToolResultReturned,
    FinalAnswer,
}

/// States visited, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopTrace {
    states: Vec<LoopState>,
}

impl LoopTrace {
    fn enter(&mut self, state: LoopState) {
        self.states.push(state);
    }

    pub fn states(&self) -> &[LoopState] {
        &self.states
    }

    pub fn last(&self) -> Option<LoopState> {
        self.states.last().copied()
    }

    pub fn model_turns(&self) -> usize {
        self.count(LoopState::AwaitingModel)
    }

    pub fn tool_executions(&self) -> usize {
        self.count(LoopState::ToolExecuting)
    }

    fn count(&self, state: LoopState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// Schema-conforming final answer.
    pub answer: Map<String, Value>,
    pub trace: LoopTrace,
    /// Outputs of every tool executed, in order.
    pub tool_outputs: Vec<ToolOutput>,
}

/// Drive the conversation until the model gives a final answer.
pub async fn run_tool_loop<B, D>(
    invoker: &ModelInvoker<B>,
    directory: &D,
    messages: Vec<ChatMessage>,
    schema: &ResponseSchema,
    tools: &[ToolDeclaration],
) -> Result<LoopOutcome, PipelineError>
where
    B: ModelBackend,
    D: DoctorDirectory,
{
    let mut conversation = messages;
    let mut trace = LoopTrace::default();
    let mut tool_outputs = Vec::new();

    for turn in 1..=MAX_MODEL_TURNS {
        trace.enter(LoopState::AwaitingModel);

        let invocations = match invoker.invoke(&conversation, schema, tools).await? {
            Invocation::Answer(answer) => {
                trace.enter(LoopState::FinalAnswer);
                tracing::debug!(turn, tools_run = tool_outputs.len(), "Final answer received");
                return Ok(LoopOutcome {
                    answer,
                    trace,
                    tool_outputs,
                });
            }
            Invocation::ToolCalls(invocations) => invocations,
        };

        trace.enter(LoopState::ToolRequested);
        let calls = invocations
            .iter()
            .map(|i| ToolCall::parse(i, tools))
            .collect::<Result<Vec<_>, _>>()?;
        conversation.push(ChatMessage::ToolCalls(invocations));

        for call in &calls {
            trace.enter(LoopState::ToolExecuting);
            let tool = call.declaration().name();
            tracing::info!(turn, tool, "Executing tool requested by model");

            let output = execute(call, directory).await;
            conversation.push(ChatMessage::ToolResult {
                name: tool.to_string(),
                content: output.to_value(),
            });
            tool_outputs.push(output);
        }
        trace.enter(LoopState::ToolResultReturned);
    }

    Err(PipelineError::SchemaMismatch(format!(
        "no final answer after {MAX_MODEL_TURNS} model turns"
    )))
}
