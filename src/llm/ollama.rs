//! Local Ollama backend (`/api/chat`).
//!
//! Supports structured output via `format`, tool calling, and image inputs.
//! Audio and PDF media are rejected: Ollama vision models only take images.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    ChatMessage, ChatRequest, ContentPart, LlmError, ModelBackend, ModelReply, PcmAudio,
    ToolInvocation,
};
use crate::models::MediaFamily;

/// Ollama HTTP client for local LLM inference.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaBackend {
    /// Create a backend pointing at a local Ollama instance.
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/');
        validate_base_url(base_url)?;
        validate_model_name(model)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OllamaFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OllamaFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

/// Translate a vendor-neutral request into Ollama's chat format.
fn build_chat_request<'a>(
    model: &'a str,
    request: &'a ChatRequest,
) -> Result<OllamaChatRequest<'a>, LlmError> {
    let mut messages = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let converted = match message {
            ChatMessage::System(text) => OllamaMessage {
                role: "system".into(),
                content: text.clone(),
                ..Default::default()
            },
            ChatMessage::User(parts) => {
                let mut content = String::new();
                let mut images = Vec::new();
                for part in parts {
                    match part {
                        ContentPart::Text(text) => content.push_str(text),
                        ContentPart::Media(uri) if uri.family() == MediaFamily::Image => {
                            images.push(uri.base64_data().to_string());
                        }
                        ContentPart::Media(uri) => {
                            return Err(LlmError::Unsupported(format!(
                                "Media of type {}",
                                uri.mime()
                            )));
                        }
                    }
                }
                OllamaMessage {
                    role: "user".into(),
                    content,
                    images,
                    ..Default::default()
                }
            }
            ChatMessage::ToolCalls(calls) => OllamaMessage {
                role: "assistant".into(),
                tool_calls: calls
                    .iter()
                    .map(|c| OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: c.name.clone(),
                            arguments: c.arguments.clone(),
                        },
                    })
                    .collect(),
                ..Default::default()
            },
            ChatMessage::ToolResult { name, content } => OllamaMessage {
                role: "tool".into(),
                content: content.to_string(),
                tool_name: Some(name.clone()),
                ..Default::default()
            },
        };
        messages.push(converted);
    }

    // `format` constrains the grammar only; the model still needs the key meanings.
    if let Some(output) = request.output.as_ref().filter(|o| !o.instructions.is_empty()) {
        let at = messages
            .iter()
            .position(|m| m.role != "system")
            .unwrap_or(messages.len());
        messages.insert(
            at,
            OllamaMessage {
                role: "system".into(),
                content: output.instructions.clone(),
                ..Default::default()
            },
        );
    }

    let tools = request
        .tools
        .iter()
        .map(|t| OllamaTool {
            kind: "function",
            function: OllamaFunction {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        })
        .collect();

    Ok(OllamaChatRequest {
        model,
        messages,
        stream: false,
        format: request.output.as_ref().map(|o| &o.json_schema),
        tools,
        options: OllamaOptions {
            temperature: request.temperature,
        },
    })
}

fn reply_from_message(message: OllamaMessage) -> ModelReply {
    if message.tool_calls.is_empty() {
        ModelReply::Text(message.content)
    } else {
        ModelReply::ToolCalls(
            message
                .tool_calls
                .into_iter()
                .map(|c| ToolInvocation {
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect(),
        )
    }
}

impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ModelReply, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = build_chat_request(&self.model, request)?;

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            if status.as_u16() == 404 && message.contains("not found") {
                return Err(LlmError::ModelNotFound(self.model.clone()));
            }
            return Err(LlmError::from_status(status.as_u16(), message));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        Ok(reply_from_message(parsed.message))
    }

    async fn synthesize_speech(&self, _text: &str) -> Result<PcmAudio, LlmError> {
        Err(LlmError::Unsupported("Text-to-speech".into()))
    }
}

// ──────────────────────────────────────────────
// Security validators
// ──────────────────────────────────────────────

/// Validate that a base URL points to localhost only.
///
/// Patient media never leaves the machine through the local backend.
/// Accepts: localhost, 127.0.0.1, [::1] (IPv6 loopback).
pub fn validate_base_url(url: &str) -> Result<(), LlmError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or(LlmError::InvalidUrl)?;

    let host = if after_scheme.starts_with('[') {
        after_scheme
            .split(']')
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
    } else {
        after_scheme
            .split(':')
            .next()
            .unwrap_or("")
            .split('/')
            .next()
            .unwrap_or("")
    };

    match host {
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        "" => Err(LlmError::InvalidUrl),
        _ => Err(LlmError::NonLocalEndpoint),
    }
}

/// Validate a model name against the Ollama naming convention:
/// `[namespace/]model[:tag]`, each segment starting alphanumeric.
pub fn validate_model_name(name: &str) -> Result<(), LlmError> {
    static VALID: OnceLock<Regex> = OnceLock::new();
    let valid = VALID.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
            .expect("static regex")
    });

    if valid.is_match(name) {
        Ok(())
    } else {
        Err(LlmError::InvalidModelName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{OutputFormat, ToolSpec};
    use crate::models::DataUri;
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn png() -> DataUri {
        DataUri::parse("data:image/png;base64,aGVsbG8=").unwrap()
    }

    fn sample_request() -> ChatRequest {
        let mut request = ChatRequest::new(vec![
            ChatMessage::System("be brief".into()),
            ChatMessage::User(vec![
                ContentPart::Text("Image: ".into()),
                ContentPart::Media(png()),
            ]),
        ]);
        request.output = Some(OutputFormat {
            json_schema: json!({"type": "object"}),
            gemini_schema: json!({"type": "OBJECT"}),
            instructions: String::new(),
        });
        request
    }

    // ── Request translation ──

    #[test]
    fn images_are_attached_as_base64() {
        let request = sample_request();
        let body = build_chat_request("medgemma", &request).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Image: ");
        assert_eq!(json["messages"][1]["images"][0], "aGVsbG8=");
        assert_eq!(json["format"]["type"], "object");
        assert_eq!(json["stream"], false);
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn schema_instructions_follow_system_prompt() {
        let mut request = sample_request();
        if let Some(output) = request.output.as_mut() {
            output.instructions = "Use these keys: summary".into();
        }
        let json = serde_json::to_value(build_chat_request("m", &request).unwrap()).unwrap();
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["messages"][1]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Use these keys: summary");
        assert_eq!(json["messages"][2]["role"], "user");
    }

    #[test]
    fn audio_is_unsupported() {
        let audio = DataUri::parse("data:audio/webm;base64,aGVsbG8=").unwrap();
        let request = ChatRequest::new(vec![ChatMessage::User(vec![ContentPart::Media(audio)])]);
        assert!(matches!(
            build_chat_request("m", &request),
            Err(LlmError::Unsupported(_))
        ));
    }

    #[test]
    fn tool_turns_are_translated() {
        let mut request = ChatRequest::new(vec![
            ChatMessage::ToolCalls(vec![ToolInvocation {
                name: "getDoctorsBySpecialty".into(),
                arguments: json!({"specialty": "Cardiologist"}),
            }]),
            ChatMessage::ToolResult {
                name: "getDoctorsBySpecialty".into(),
                content: json!([]),
            },
        ]);
        request.tools.push(ToolSpec {
            name: "getDoctorsBySpecialty".into(),
            description: "find doctors".into(),
            parameters: json!({"type": "object"}),
            gemini_parameters: json!({"type": "OBJECT"}),
        });

        let json = serde_json::to_value(build_chat_request("m", &request).unwrap()).unwrap();
        assert_eq!(json["messages"][0]["role"], "assistant");
        assert_eq!(
            json["messages"][0]["tool_calls"][0]["function"]["arguments"]["specialty"],
            "Cardiologist"
        );
        assert_eq!(json["messages"][1]["role"], "tool");
        assert_eq!(json["messages"][1]["content"], "[]");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "getDoctorsBySpecialty");
    }

    #[test]
    fn tool_call_reply_is_decoded() {
        let message: OllamaMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{"function": {"name": "f", "arguments": {"specialty": "ENT"}}}]
        }))
        .unwrap();
        match reply_from_message(message) {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].arguments["specialty"], "ENT");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    // ── Live round-trip against a stub server ──

    async fn serve(status: u16, response: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/api/chat",
                post(
                    move |State(seen): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| {
                        let response = response.clone();
                        async move {
                            seen.lock().unwrap().push(body);
                            (
                                axum::http::StatusCode::from_u16(status).unwrap(),
                                Json(response),
                            )
                        }
                    },
                ),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://127.0.0.1:{port}"), seen)
    }

    #[tokio::test]
    async fn chat_returns_text_answer() {
        let (url, seen) = serve(
            200,
            json!({"message": {"role": "assistant", "content": "{\"ok\":true}"}, "done": true}),
        )
        .await;
        let backend = OllamaBackend::new(&url, "medgemma:4b", 5).unwrap();

        let reply = backend.chat(&sample_request()).await.unwrap();
        assert_eq!(reply, ModelReply::Text("{\"ok\":true}".into()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["model"], "medgemma:4b");
    }

    #[tokio::test]
    async fn missing_model_is_reported() {
        let (url, _) = serve(404, json!({"error": "model 'medgemma:4b' not found"})).await;
        let backend = OllamaBackend::new(&url, "medgemma:4b", 5).unwrap();
        assert_eq!(
            backend.chat(&sample_request()).await,
            Err(LlmError::ModelNotFound("medgemma:4b".into()))
        );
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let (url, _) = serve(500, json!({"error": "out of memory"})).await;
        let backend = OllamaBackend::new(&url, "medgemma:4b", 5).unwrap();
        let err = backend.chat(&sample_request()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let backend = OllamaBackend::new("http://127.0.0.1:9", "medgemma", 2).unwrap();
        let err = backend.chat(&sample_request()).await.unwrap_err();
        assert!(err.is_transient());
    }

    // ── Validators ──

    #[test]
    fn validate_url_accepts_loopback_hosts() {
        assert!(validate_base_url("http://localhost:11434").is_ok());
        assert!(validate_base_url("http://127.0.0.1:11434").is_ok());
        assert!(validate_base_url("http://[::1]:11434").is_ok());
        assert!(validate_base_url("https://localhost").is_ok());
    }

    #[test]
    fn validate_url_rejects_remote_and_malformed() {
        assert_eq!(validate_base_url("http://evil.com:11434"), Err(LlmError::NonLocalEndpoint));
        assert_eq!(validate_base_url("http://192.168.1.100:11434"), Err(LlmError::NonLocalEndpoint));
        assert_eq!(validate_base_url("localhost:11434"), Err(LlmError::InvalidUrl));
        assert_eq!(validate_base_url(""), Err(LlmError::InvalidUrl));
    }

    #[test]
    fn validate_name_accepts_common_forms() {
        assert!(validate_model_name("medgemma").is_ok());
        assert!(validate_model_name("medgemma:4b").is_ok());
        assert!(validate_model_name("llama3.1:8b").is_ok());
        assert!(validate_model_name("dcarrascosa/medgemma-1.5-4b-it").is_ok());
    }

    #[test]
    fn validate_name_rejects_injection() {
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("../etc/passwd").is_err());
        assert!(validate_model_name("; rm -rf /").is_err());
        assert!(validate_model_name("a//b").is_err());
        assert!(validate_model_name("a/b/c").is_err());
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/", "medgemma", 60).unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
        assert_eq!(backend.model(), "medgemma");
    }

    #[test]
    fn constructor_rejects_remote_host() {
        assert!(matches!(
            OllamaBackend::new("http://example.com", "medgemma", 60),
            Err(LlmError::NonLocalEndpoint)
        ));
    }
}
