use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PipelineError;
use crate::config::DEFAULT_LANGUAGE;

/// AI-backed features exposed by the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SymptomAdvice,
    ImageDiagnosis,
    VoiceAnalysis,
    RecordAnalysis,
    ReportAnalysis,
    TextToSpeech,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Self::SymptomAdvice,
        Self::ImageDiagnosis,
        Self::VoiceAnalysis,
        Self::RecordAnalysis,
        Self::ReportAnalysis,
        Self::TextToSpeech,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymptomAdvice => "symptom_advice",
            Self::ImageDiagnosis => "image_diagnosis",
            Self::VoiceAnalysis => "voice_analysis",
            Self::RecordAnalysis => "record_analysis",
            Self::ReportAnalysis => "report_analysis",
            Self::TextToSpeech => "text_to_speech",
        }
    }

    /// Short command-line name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::SymptomAdvice => "symptoms",
            Self::ImageDiagnosis => "image",
            Self::VoiceAnalysis => "voice",
            Self::RecordAnalysis => "record",
            Self::ReportAnalysis => "report",
            Self::TextToSpeech => "speech",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown feature '{0}'")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    /// Accepts either the command name or the snake_case name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.command() == s || f.as_str() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// Explicit per-call context, replacing any process-wide language setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Answer language used when a request does not name one.
    pub language: String,
}

impl RequestContext {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

// ──────────────────────────────────────────────
// Feature requests (wire shapes, not yet validated)
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomAdviceRequest {
    pub symptoms: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDiagnosisRequest {
    pub photo_data_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceAnalysisRequest {
    pub voice_data_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAnalysisRequest {
    pub file_data_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAnalysisRequest {
    pub report_data_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
}

/// Any feature request, tagged by feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "snake_case")]
pub enum AnalysisRequest {
    SymptomAdvice(SymptomAdviceRequest),
    ImageDiagnosis(ImageDiagnosisRequest),
    VoiceAnalysis(VoiceAnalysisRequest),
    RecordAnalysis(RecordAnalysisRequest),
    ReportAnalysis(ReportAnalysisRequest),
    TextToSpeech(SpeechRequest),
}

impl AnalysisRequest {
    pub fn feature(&self) -> Feature {
        match self {
            Self::SymptomAdvice(_) => Feature::SymptomAdvice,
            Self::ImageDiagnosis(_) => Feature::ImageDiagnosis,
            Self::VoiceAnalysis(_) => Feature::VoiceAnalysis,
            Self::RecordAnalysis(_) => Feature::RecordAnalysis,
            Self::ReportAnalysis(_) => Feature::ReportAnalysis,
            Self::TextToSpeech(_) => Feature::TextToSpeech,
        }
    }

    /// The request body as a raw JSON object, without the `feature` tag.
    pub fn to_raw(&self) -> Result<Value, PipelineError> {
        match self {
            Self::SymptomAdvice(r) => to_raw(r),
            Self::ImageDiagnosis(r) => to_raw(r),
            Self::VoiceAnalysis(r) => to_raw(r),
            Self::RecordAnalysis(r) => to_raw(r),
            Self::ReportAnalysis(r) => to_raw(r),
            Self::TextToSpeech(r) => to_raw(r),
        }
    }
}

/// Serialize a typed request into the raw form the validator checks.
pub fn to_raw<R: Serialize>(request: &R) -> Result<Value, PipelineError> {
    serde_json::to_value(request).map_err(|e| PipelineError::Internal(e.to_string()))
}
