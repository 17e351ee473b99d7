//! Request validation, run before anything touches the network.
//!
//! Each feature declares an `InputSchema`. `validate` checks a raw JSON request
//! against it, collecting every offending field rather than stopping at the
//! first, and resolves the answer language from the request or the context.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use super::request::RequestContext;
use crate::models::{DataUri, MediaError, MediaFamily};

/// Longest language name accepted.
pub const MAX_LANGUAGE_CHARS: usize = 40;

/// Field carrying the answer language. Optional for every feature.
pub const LANGUAGE_FIELD: &str = "language";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputKind {
    /// Required free text, length counted in characters after trimming.
    Text { min_chars: usize, max_chars: usize },
    OptionalText { max_chars: usize },
    /// Required data URI whose MIME type falls in one of `accept`.
    Media { accept: &'static [MediaFamily] },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputField {
    pub name: &'static str,
    /// Human name used in messages, e.g. "Photo".
    pub label: &'static str,
    pub kind: InputKind,
    /// Shown when the field is absent, empty, or (for text) too short.
    pub missing_message: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSchema {
    pub fields: &'static [InputField],
    /// Whether the request carries an answer language.
    pub localized: bool,
}

// ═══════════════════════════════════════════════════════════
// Per-feature input schemas
// ═══════════════════════════════════════════════════════════

pub const SYMPTOM_ADVICE_INPUT: InputSchema = InputSchema {
    fields: &[InputField {
        name: "symptoms",
        label: "Symptoms",
        kind: InputKind::Text {
            min_chars: 10,
            max_chars: 2000,
        },
        missing_message: "Please describe your symptoms in more detail.",
    }],
    localized: true,
};

pub const IMAGE_DIAGNOSIS_INPUT: InputSchema = InputSchema {
    fields: &[
        InputField {
            name: "photoDataUri",
            label: "Photo",
            kind: InputKind::Media {
                accept: &[MediaFamily::Image],
            },
            missing_message: "Please upload an image.",
        },
        InputField {
            name: "description",
            label: "Description",
            kind: InputKind::OptionalText { max_chars: 1000 },
            missing_message: "",
        },
    ],
    localized: true,
};

pub const VOICE_ANALYSIS_INPUT: InputSchema = InputSchema {
    fields: &[InputField {
        name: "voiceDataUri",
        label: "Voice recording",
        kind: InputKind::Media {
            accept: &[MediaFamily::Audio],
        },
        missing_message: "Please record your symptoms.",
    }],
    localized: true,
};

pub const RECORD_ANALYSIS_INPUT: InputSchema = InputSchema {
    fields: &[InputField {
        name: "fileDataUri",
        label: "Health record",
        kind: InputKind::Media {
            accept: &[MediaFamily::Image, MediaFamily::Pdf],
        },
        missing_message: "Please upload a health record.",
    }],
    localized: true,
};

pub const REPORT_ANALYSIS_INPUT: InputSchema = InputSchema {
    fields: &[InputField {
        name: "reportDataUri",
        label: "Health report",
        kind: InputKind::Media {
            accept: &[MediaFamily::Image, MediaFamily::Pdf],
        },
        missing_message: "Please upload a health report.",
    }],
    localized: true,
};

pub const SPEECH_INPUT: InputSchema = InputSchema {
    fields: &[InputField {
        name: "text",
        label: "Text",
        kind: InputKind::Text {
            min_chars: 1,
            max_chars: 5000,
        },
        missing_message: "Please provide text to read aloud.",
    }],
    localized: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// One or more request fields failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|i| i.field.as_str())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .issues
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationError {}

/// A request that passed validation. Text is trimmed, media parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    texts: BTreeMap<&'static str, String>,
    media: BTreeMap<&'static str, DataUri>,
    language: String,
}

impl ValidatedRequest {
    pub fn text(&self, field: &str) -> Option<&str> {
        self.texts.get(field).map(String::as_str)
    }

    pub fn media(&self, field: &str) -> Option<&DataUri> {
        self.media.get(field)
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

fn family_list(accept: &[MediaFamily]) -> String {
    accept
        .iter()
        .map(MediaFamily::label)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Present, non-null value of `name`.
fn lookup<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|v| !v.is_null())
}

fn check_field(
    field: &InputField,
    object: &Map<String, Value>,
    out: &mut ValidatedRequest,
) -> Result<(), String> {
    let value = lookup(object, field.name);

    let text = match value {
        None => None,
        Some(Value::String(s)) => Some(s.trim()),
        Some(_) => return Err(format!("{} must be text", field.label)),
    };

    match (field.kind, text) {
        (InputKind::OptionalText { .. }, None) => Ok(()),
        (InputKind::OptionalText { .. }, Some("")) => Ok(()),
        (_, None) | (_, Some("")) => Err(field.missing_message.to_string()),

        (InputKind::Text { min_chars, max_chars }, Some(s)) => {
            let chars = s.chars().count();
            if chars < min_chars {
                Err(field.missing_message.to_string())
            } else if chars > max_chars {
                Err(format!("{} must be at most {max_chars} characters", field.label))
            } else {
                out.texts.insert(field.name, s.to_string());
                Ok(())
            }
        }

        (InputKind::OptionalText { max_chars }, Some(s)) => {
            if s.chars().count() > max_chars {
                Err(format!("{} must be at most {max_chars} characters", field.label))
            } else {
                out.texts.insert(field.name, s.to_string());
                Ok(())
            }
        }

        (InputKind::Media { accept }, Some(s)) => {
            let uri = DataUri::parse(s).map_err(|e: MediaError| format!("{} {e}", field.label))?;
            if !accept.contains(&uri.family()) {
                return Err(format!(
                    "{} must be {}, got '{}'",
                    field.label,
                    family_list(accept),
                    uri.mime()
                ));
            }
            out.media.insert(field.name, uri);
            Ok(())
        }
    }
}

fn resolve_language(
    object: &Map<String, Value>,
    ctx: &RequestContext,
) -> Result<String, String> {
    let language = match lookup(object, LANGUAGE_FIELD) {
        None => ctx.language.trim(),
        Some(Value::String(s)) => s.trim(),
        Some(_) => return Err("Language must be text".to_string()),
    };

    if language.is_empty() {
        Err("Please choose a language".to_string())
    } else if language.chars().count() > MAX_LANGUAGE_CHARS {
        Err(format!("Language must be at most {MAX_LANGUAGE_CHARS} characters"))
    } else {
        Ok(language.to_string())
    }
}

/// Validate `raw` against `schema`. All offending fields are reported together.
pub fn validate(
    raw: &Value,
    schema: &InputSchema,
    ctx: &RequestContext,
) -> Result<ValidatedRequest, ValidationError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationError::single("$", "Request must be a JSON object"))?;

    let mut out = ValidatedRequest {
        texts: BTreeMap::new(),
        media: BTreeMap::new(),
        language: String::new(),
    };
    let mut issues = Vec::new();

    for field in schema.fields {
        if let Err(message) = check_field(field, object, &mut out) {
            issues.push(FieldIssue {
                field: field.name.to_string(),
                message,
            });
        }
    }

    if schema.localized {
        match resolve_language(object, ctx) {
            Ok(language) => out.language = language,
            Err(message) => issues.push(FieldIssue {
                field: LANGUAGE_FIELD.to_string(),
                message,
            }),
        }
    }

    if issues.is_empty() {
        Ok(out)
    } else {
        Err(ValidationError { issues })
    }
}
