//! Hosted Gemini backend (`models/{model}:generateContent`).
//!
//! Handles every media family the pipeline accepts (images, audio, PDF) and
//! the prebuilt-voice speech model.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    ChatMessage, ChatRequest, ContentPart, LlmError, ModelBackend, ModelReply, PcmAudio,
    ToolInvocation,
};

/// Sample rate Gemini speech models emit when the MIME type omits it.
pub const DEFAULT_SPEECH_RATE: u32 = 24_000;

pub struct GeminiBackend {
    base_url: String,
    api_key: String,
    model: String,
    tts_model: String,
    voice: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl GeminiBackend {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        tts_model: &str,
        voice: &str,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(LlmError::InvalidUrl);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            tts_model: tts_model.to_string(),
            voice: voice.to_string(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, LlmError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(classify_failure(status.as_u16(), message, model));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))
    }
}

fn classify_failure(status: u16, message: String, model: &str) -> LlmError {
    match status {
        404 => LlmError::ModelNotFound(model.to_string()),
        // An invalid key is reported as a bad request rather than 401.
        400 if message.contains("API key") => LlmError::Unauthorized(message),
        _ => LlmError::from_status(status, message),
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    generation_config: Value,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<FunctionCall>,
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

// ──────────────────────────────────────────────
// Translation
// ──────────────────────────────────────────────

fn build_chat_request(request: &ChatRequest) -> GenerateContentRequest {
    let mut system = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for message in &request.messages {
        match message {
            ChatMessage::System(text) => system.push(text.clone()),
            ChatMessage::User(parts) => contents.push(Content {
                role: Some("user"),
                parts: parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => Part::Text { text: text.clone() },
                        ContentPart::Media(uri) => Part::InlineData {
                            inline_data: InlineData {
                                mime_type: uri.mime().to_string(),
                                data: uri.base64_data().to_string(),
                            },
                        },
                    })
                    .collect(),
            }),
            ChatMessage::ToolCalls(calls) => contents.push(Content {
                role: Some("model"),
                parts: calls
                    .iter()
                    .map(|c| Part::FunctionCall {
                        function_call: FunctionCall {
                            name: c.name.clone(),
                            args: c.arguments.clone(),
                        },
                    })
                    .collect(),
            }),
            ChatMessage::ToolResult { name, content } => {
                let part = Part::FunctionResponse {
                    function_response: FunctionResponse {
                        name: name.clone(),
                        response: json!({ "name": name, "content": content }),
                    },
                };
                // Responses to one model turn travel together.
                match contents.last_mut() {
                    Some(last)
                        if last.role == Some("user")
                            && matches!(last.parts.first(), Some(Part::FunctionResponse { .. })) =>
                    {
                        last.parts.push(part)
                    }
                    _ => contents.push(Content {
                        role: Some("user"),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    let mut generation_config = json!({ "temperature": request.temperature });
    if let Some(output) = &request.output {
        if request.tools.is_empty() {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = output.gemini_schema.clone();
        } else {
            // Native JSON mode cannot be combined with function calling.
            system.push(output.instructions.clone());
        }
    }

    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![json!({
            "functionDeclarations": request
                .tools
                .iter()
                .map(|t| json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.gemini_parameters,
                }))
                .collect::<Vec<_>>()
        })]
    };

    let system_instruction = (!system.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part::Text {
            text: system.join("\n\n"),
        }],
    });

    GenerateContentRequest {
        system_instruction,
        contents,
        tools,
        generation_config,
    }
}

fn build_speech_request(text: &str, voice: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: None,
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part::Text {
                text: text.to_string(),
            }],
        }],
        tools: Vec::new(),
        generation_config: json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice }
                }
            }
        }),
    }
}

/// First candidate's parts, or an error explaining why there are none.
fn candidate_parts(response: GenerateContentResponse) -> Result<Vec<ResponsePart>, LlmError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::MalformedResponse(format!("prompt blocked: {reason}")));
    }
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("no candidates".into()))?;

    match candidate.content {
        Some(content) if !content.parts.is_empty() => Ok(content.parts),
        _ => Err(LlmError::MalformedResponse(format!(
            "empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}

fn reply_from_response(response: GenerateContentResponse) -> Result<ModelReply, LlmError> {
    let parts = candidate_parts(response)?;

    let calls: Vec<ToolInvocation> = parts
        .iter()
        .filter_map(|p| p.function_call.as_ref())
        .map(|c| ToolInvocation {
            name: c.name.clone(),
            arguments: c.args.clone(),
        })
        .collect();
    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls(calls));
    }

    let text: String = parts
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();
    Ok(ModelReply::Text(text))
}

/// Parse `rate=` out of e.g. `audio/L16;codec=pcm;rate=24000`.
fn sample_rate_of(mime: &str) -> u32 {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
        .unwrap_or(DEFAULT_SPEECH_RATE)
}

fn audio_from_response(response: GenerateContentResponse) -> Result<PcmAudio, LlmError> {
    let inline = candidate_parts(response)?
        .into_iter()
        .find_map(|p| p.inline_data)
        .ok_or_else(|| LlmError::MalformedResponse("no audio in speech response".into()))?;

    let data = STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| LlmError::MalformedResponse(format!("audio is not base64: {e}")))?;

    Ok(PcmAudio::mono_16bit(sample_rate_of(&inline.mime_type), data))
}

impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ModelReply, LlmError> {
        let body = build_chat_request(request);
        let response = self.generate(&self.model, &body).await?;
        reply_from_response(response)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<PcmAudio, LlmError> {
        let body = build_speech_request(text, &self.voice);
        let response = self.generate(&self.tts_model, &body).await?;
        audio_from_response(response)
    }
}
