use serde_json::Value;

use crate::models::DataUri;

/// One piece of user-supplied content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Media(DataUri),
}

/// A tool invocation as requested by the model, before it is checked against
/// the declared tools.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// A conversation turn sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(Vec<ContentPart>),
    /// The model's own earlier turn asking for tools, echoed back for context.
    ToolCalls(Vec<ToolInvocation>),
    /// The result of executing one requested tool.
    ToolResult { name: String, content: Value },
}

/// Vendor-neutral description of a callable tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Parameters as a lowercase JSON Schema object.
    pub parameters: Value,
    /// The same parameters in the upper-case OpenAPI dialect Gemini expects.
    pub gemini_parameters: Value,
}

/// Declared shape of the final answer, in both schema dialects.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    pub json_schema: Value,
    pub gemini_schema: Value,
    /// Human-readable key list, appended to the prompt when the backend
    /// cannot enforce the schema natively.
    pub instructions: String,
}

/// Everything a backend needs for one round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub output: Option<OutputFormat>,
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            output: None,
            tools: Vec::new(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Media attached to user turns, in order.
    pub fn media(&self) -> impl Iterator<Item = &DataUri> {
        self.messages.iter().flat_map(|m| match m {
            ChatMessage::User(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Media(uri) => Some(uri),
                    ContentPart::Text(_) => None,
                })
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        })
    }
}

/// Low temperature keeps medical answers reproducible.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// What the model sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCalls(Vec<ToolInvocation>),
}

/// Raw little-endian PCM audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data: Vec<u8>,
}

impl PcmAudio {
    /// 24 kHz, 16-bit, mono: the format hosted TTS voices produce.
    pub fn mono_16bit(sample_rate: u32, data: Vec<u8>) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
            data,
        }
    }
}
