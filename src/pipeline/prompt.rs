//! Prompt templates and rendering.
//!
//! Templates use `{{field}}` for text fields and `{{media field}}` for media,
//! which becomes an inline media part at that position. `{{language}}` is the
//! resolved answer language. A localized request always ends with an explicit
//! answer-language directive. Rendering is pure: the same request renders to
//! the same prompt.

use super::validation::{InputKind, InputSchema, ValidatedRequest, LANGUAGE_FIELD};
use super::PipelineError;
use crate::llm::{ChatMessage, ContentPart};

/// Substituted for optional fields the patient left empty.
pub const NOT_PROVIDED: &str = "Not provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: &'static str,
    pub body: &'static str,
}

/// A rendered prompt, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub parts: Vec<ContentPart>,
}

impl Prompt {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        vec![ChatMessage::System(self.system), ChatMessage::User(self.parts)]
    }

    /// Text content only, media omitted.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::Media(_) => None,
            })
            .collect()
    }
}

fn language_directive(language: &str) -> String {
    format!(
        "\n\nWrite the entire response in {language}. Every string value in your answer must be in {language}."
    )
}

/// Render `template` for a request validated against `schema`.
///
/// Fails with `Internal` on a placeholder that `schema` does not declare, since
/// that is a template bug rather than bad input.
pub fn render(
    template: &PromptTemplate,
    schema: &InputSchema,
    request: &ValidatedRequest,
) -> Result<Prompt, PipelineError> {
    let mut parts = Vec::new();
    let mut buffer = String::new();
    let mut rest = template.body;

    while let Some(start) = rest.find("{{") {
        buffer.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            PipelineError::Internal("unterminated placeholder in prompt template".into())
        })?;
        let placeholder = after[..end].trim();
        rest = &after[end + 2..];

        if let Some(field) = placeholder.strip_prefix("media ") {
            let field = field.trim();
            let declared = schema
                .fields
                .iter()
                .any(|f| f.name == field && matches!(f.kind, InputKind::Media { .. }));
            let uri = request
                .media(field)
                .filter(|_| declared)
                .ok_or_else(|| PipelineError::Internal(format!("unknown media placeholder '{field}'")))?;
            if !buffer.is_empty() {
                parts.push(ContentPart::Text(std::mem::take(&mut buffer)));
            }
            parts.push(ContentPart::Media(uri.clone()));
        } else if placeholder == LANGUAGE_FIELD && schema.localized {
            buffer.push_str(request.language());
        } else {
            let declared = schema.fields.iter().any(|f| {
                f.name == placeholder
                    && matches!(f.kind, InputKind::Text { .. } | InputKind::OptionalText { .. })
            });
            if !declared {
                return Err(PipelineError::Internal(format!(
                    "unknown placeholder '{placeholder}'"
                )));
            }
            buffer.push_str(request.text(placeholder).unwrap_or(NOT_PROVIDED));
        }
    }
    buffer.push_str(rest);

    if schema.localized {
        buffer.push_str(&language_directive(request.language()));
    }
    if !buffer.is_empty() {
        parts.push(ContentPart::Text(buffer));
    }

    Ok(Prompt {
        system: template.system.to_string(),
        parts,
    })
}

// ═══════════════════════════════════════════════════════════
// Feature templates
// ═══════════════════════════════════════════════════════════

const CLINIC_ASSISTANT: &str = "You are the medical assistant of a telehealth clinic. \
Your assessments are preliminary and never replace a consultation with a qualified doctor. \
Be clear and practical, and avoid alarming language unless the situation is urgent.";

pub const SYMPTOM_ADVICE_PROMPT: PromptTemplate = PromptTemplate {
    system: CLINIC_ASSISTANT,
    body: "A patient describes these symptoms:\n{{symptoms}}\n\n\
Give general health advice for these symptoms, list the conditions that could explain them, \
suggest concrete actions the patient can take, and assess how urgently they should see a doctor. \
Start the urgency with Low, Medium or High.",
};

pub const IMAGE_DIAGNOSIS_PROMPT: PromptTemplate = PromptTemplate {
    system: CLINIC_ASSISTANT,
    body: "Examine this photo of a skin condition or wound together with the patient's note.\n\n\
Photo: {{media photoDataUri}}\n\
Patient's note: {{description}}\n\n\
Give a preliminary diagnosis with your confidence as a number from 0 to 1, describe what the photo shows, \
rate the severity, list the symptoms that usually come with the condition, and say whether the patient \
should seek professional care and what to do next.",
};

pub const VOICE_ANALYSIS_PROMPT: PromptTemplate = PromptTemplate {
    system: CLINIC_ASSISTANT,
    body: "The recording below is a patient describing their symptoms, most likely in {{language}}.\n\n\
Recording: {{media voiceDataUri}}\n\n\
Transcribe what the patient says. Then list the possible causes with a short explanation for each, \
suggest next steps, and assess how urgently they should see a doctor. \
Start the urgency with Low, Medium or High.",
};

pub const RECORD_ANALYSIS_PROMPT: PromptTemplate = PromptTemplate {
    system: CLINIC_ASSISTANT,
    body: "Review the attached health record. It may be a photo or a PDF.\n\n\
Health record: {{media fileDataUri}}\n\n\
Summarise the record, list its key findings, give a preliminary diagnosis, suggest medication a doctor \
might consider, and name the kind of specialist the patient should see. \
Use the getDoctorsBySpecialty tool with that specialty to find clinic doctors and list the ones it returns \
as suggestedDoctors. If it returns none, leave suggestedDoctors out.",
};

pub const REPORT_ANALYSIS_PROMPT: PromptTemplate = PromptTemplate {
    system: CLINIC_ASSISTANT,
    body: "Review the attached health report.\n\n\
Report: {{media reportDataUri}}\n\n\
Analyse the key findings in detail, then suggest medications. For each give the name, the dosage, \
how often to take it, and the finding that motivates it.",
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::request::RequestContext;
    use crate::pipeline::validation::{
        validate, IMAGE_DIAGNOSIS_INPUT, RECORD_ANALYSIS_INPUT, SYMPTOM_ADVICE_INPUT,
        VOICE_ANALYSIS_INPUT,
    };
    use serde_json::json;

    fn symptoms(language: &str) -> ValidatedRequest {
        validate(
            &json!({"symptoms": "I have a headache and mild fever", "language": language}),
            &SYMPTOM_ADVICE_INPUT,
            &RequestContext::default(),
        )
        .unwrap()
    }

    #[test]
    fn text_fields_are_substituted() {
        let prompt = render(&SYMPTOM_ADVICE_PROMPT, &SYMPTOM_ADVICE_INPUT, &symptoms("English")).unwrap();
        assert_eq!(prompt.parts.len(), 1);
        let text = prompt.text();
        assert!(text.contains("I have a headache and mild fever"));
        assert!(!text.contains("{{"));
        assert!(prompt.system.contains("never replace a consultation"));
    }

    #[test]
    fn language_directive_is_appended() {
        let prompt = render(&SYMPTOM_ADVICE_PROMPT, &SYMPTOM_ADVICE_INPUT, &symptoms("Tamil")).unwrap();
        assert!(prompt.text().ends_with("Every string value in your answer must be in Tamil."));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render(&SYMPTOM_ADVICE_PROMPT, &SYMPTOM_ADVICE_INPUT, &symptoms("Hindi")).unwrap();
        let b = render(&SYMPTOM_ADVICE_PROMPT, &SYMPTOM_ADVICE_INPUT, &symptoms("Hindi")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn media_becomes_inline_part_in_place() {
        let request = validate(
            &json!({"photoDataUri": "data:image/png;base64,aGVsbG8=", "description": "itchy rash"}),
            &IMAGE_DIAGNOSIS_INPUT,
            &RequestContext::default(),
        )
        .unwrap();
        let prompt = render(&IMAGE_DIAGNOSIS_PROMPT, &IMAGE_DIAGNOSIS_INPUT, &request).unwrap();

        assert_eq!(prompt.parts.len(), 3);
        assert!(matches!(&prompt.parts[0], ContentPart::Text(t) if t.ends_with("Photo: ")));
        assert!(matches!(&prompt.parts[1], ContentPart::Media(uri) if uri.mime() == "image/png"));
        assert!(matches!(&prompt.parts[2], ContentPart::Text(t) if t.contains("Patient's note: itchy rash")));
    }

    #[test]
    fn missing_optional_field_reads_not_provided() {
        let request = validate(
            &json!({"photoDataUri": "data:image/png;base64,aGVsbG8="}),
            &IMAGE_DIAGNOSIS_INPUT,
            &RequestContext::default(),
        )
        .unwrap();
        let prompt = render(&IMAGE_DIAGNOSIS_PROMPT, &IMAGE_DIAGNOSIS_INPUT, &request).unwrap();
        assert!(prompt.text().contains("Patient's note: Not provided"));
    }

    #[test]
    fn language_placeholder_uses_resolved_language() {
        let request = validate(
            &json!({"voiceDataUri": "data:audio/webm;base64,aGVsbG8="}),
            &VOICE_ANALYSIS_INPUT,
            &RequestContext::new("Kannada"),
        )
        .unwrap();
        let prompt = render(&VOICE_ANALYSIS_PROMPT, &VOICE_ANALYSIS_INPUT, &request).unwrap();
        assert!(prompt.text().contains("most likely in Kannada"));
    }

    #[test]
    fn record_prompt_mentions_tool() {
        let request = validate(
            &json!({"fileDataUri": "data:application/pdf;base64,JVBERi0xLjQ="}),
            &RECORD_ANALYSIS_INPUT,
            &RequestContext::default(),
        )
        .unwrap();
        let prompt = render(&RECORD_ANALYSIS_PROMPT, &RECORD_ANALYSIS_INPUT, &request).unwrap();
        assert!(prompt.text().contains("getDoctorsBySpecialty"));
        let messages = prompt.into_messages();
        assert!(matches!(messages[0], ChatMessage::System(_)));
        assert!(matches!(&messages[1], ChatMessage::User(parts) if parts.len() == 3));
    }

    #[test]
    fn undeclared_placeholder_is_internal_error() {
        let template = PromptTemplate {
            system: "s",
            body: "Age: {{age}}",
        };
        let err = render(&template, &SYMPTOM_ADVICE_INPUT, &symptoms("English")).unwrap_err();
        assert!(matches!(err, PipelineError::Internal(m) if m.contains("age")));
    }

    #[test]
    fn unterminated_placeholder_is_internal_error() {
        let template = PromptTemplate {
            system: "s",
            body: "Symptoms: {{symptoms",
        };
        assert!(matches!(
            render(&template, &SYMPTOM_ADVICE_INPUT, &symptoms("English")),
            Err(PipelineError::Internal(_))
        ));
    }

    #[test]
    fn media_placeholder_for_text_field_is_rejected() {
        let template = PromptTemplate {
            system: "s",
            body: "{{media symptoms}}",
        };
        assert!(render(&template, &SYMPTOM_ADVICE_INPUT, &symptoms("English")).is_err());
    }
}
