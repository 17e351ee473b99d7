//! Feature result types and the mapping from a conformed model answer.
//!
//! Field names on the wire are exactly the schema's field names. Optional
//! fields the model omitted stay absent when serialized.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::{
    ResponseSchema, HEALTH_ADVICE, IMAGE_DIAGNOSIS, RECORD_ANALYSIS, REPORT_ANALYSIS,
    VOICE_ANALYSIS,
};
use super::PipelineError;
use crate::models::DoctorRecord;

/// A result type backed by a declared output schema.
pub trait FeatureResult: Serialize + DeserializeOwned {
    const SCHEMA: &'static ResponseSchema;
}

/// Map a schema-conforming answer into its result type.
pub fn normalize<T: FeatureResult>(answer: Map<String, Value>) -> Result<T, PipelineError> {
    serde_json::from_value(Value::Object(answer)).map_err(|e| {
        PipelineError::SchemaMismatch(format!("{} does not fit its result type: {e}", T::SCHEMA.name))
    })
}

/// Coarse urgency bucket, read from the leading word of an urgency string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl UrgencyLevel {
    pub fn parse(urgency: &str) -> Self {
        let lead = urgency
            .trim_start()
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lead.as_str() {
            "low" => Self::Low,
            "medium" | "moderate" => Self::Medium,
            "high" | "urgent" => Self::High,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAdvice {
    pub preliminary_advice: String,
    pub possible_conditions: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub urgency: String,
}

impl HealthAdvice {
    pub fn urgency_level(&self) -> UrgencyLevel {
        UrgencyLevel::parse(&self.urgency)
    }
}

impl FeatureResult for HealthAdvice {
    const SCHEMA: &'static ResponseSchema = &HEALTH_ADVICE;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDiagnosis {
    pub diagnosis: String,
    pub confidence_score: f64,
    pub detailed_description: String,
    pub severity: String,
    pub common_symptoms: Vec<String>,
    pub recommendation: String,
}

impl FeatureResult for ImageDiagnosis {
    const SCHEMA: &'static ResponseSchema = &IMAGE_DIAGNOSIS;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossibleCause {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceAnalysis {
    pub transcribed_symptoms: String,
    pub possible_causes: Vec<PossibleCause>,
    pub suggested_next_steps: Vec<String>,
    pub urgency: String,
}

impl VoiceAnalysis {
    pub fn urgency_level(&self) -> UrgencyLevel {
        UrgencyLevel::parse(&self.urgency)
    }
}

impl FeatureResult for VoiceAnalysis {
    const SCHEMA: &'static ResponseSchema = &VOICE_ANALYSIS;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAnalysis {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub preliminary_diagnosis: String,
    pub suggested_medication: String,
    pub suggested_specialist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_doctors: Option<Vec<DoctorRecord>>,
}

impl FeatureResult for RecordAnalysis {
    const SCHEMA: &'static ResponseSchema = &RECORD_ANALYSIS;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationSuggestion {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAnalysis {
    pub analysis: String,
    pub suggested_medication: Vec<MedicationSuggestion>,
}

impl FeatureResult for ReportAnalysis {
    const SCHEMA: &'static ResponseSchema = &REPORT_ANALYSIS;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn conform<T: FeatureResult>(value: Value) -> T {
        normalize(T::SCHEMA.conform(&value).unwrap()).unwrap()
    }

    fn keys(value: &Value) -> BTreeSet<String> {
        value.as_object().unwrap().keys().cloned().collect()
    }

    fn declared(schema: &ResponseSchema, include_optional: bool) -> BTreeSet<String> {
        schema
            .fields
            .iter()
            .filter(|f| f.required || include_optional)
            .map(|f| f.name.to_string())
            .collect()
    }

    #[test]
    fn advice_serializes_exactly_declared_fields() {
        let advice: HealthAdvice = conform(json!({
            "preliminaryAdvice": "Rest",
            "possibleConditions": ["Flu"],
            "suggestedActions": ["Drink fluids"],
            "urgency": "Medium - See a doctor within 24 hours",
            "extra": true
        }));
        assert_eq!(advice.urgency_level(), UrgencyLevel::Medium);
        let json = serde_json::to_value(&advice).unwrap();
        assert_eq!(keys(&json), declared(&HEALTH_ADVICE, true));
    }

    #[test]
    fn image_diagnosis_keeps_score() {
        let diagnosis: ImageDiagnosis = conform(json!({
            "diagnosis": "Contact dermatitis",
            "confidenceScore": 0.7,
            "detailedDescription": "Red patches",
            "severity": "mild",
            "commonSymptoms": ["Itching", "Redness"],
            "recommendation": "Avoid the irritant"
        }));
        assert_eq!(diagnosis.confidence_score, 0.7);
        let json = serde_json::to_value(&diagnosis).unwrap();
        assert_eq!(keys(&json), declared(&IMAGE_DIAGNOSIS, true));
    }

    #[test]
    fn record_without_doctors_omits_field() {
        let record: RecordAnalysis = conform(json!({
            "summary": "Normal blood count",
            "keyFindings": [],
            "preliminaryDiagnosis": "Healthy",
            "suggestedMedication": "None",
            "suggestedSpecialist": "General Physician"
        }));
        assert!(record.suggested_doctors.is_none());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(keys(&json), declared(&RECORD_ANALYSIS, false));
        assert!(json.get("suggestedDoctors").is_none());
    }

    #[test]
    fn record_with_doctors_includes_them() {
        let record: RecordAnalysis = conform(json!({
            "summary": "s",
            "keyFindings": ["k"],
            "preliminaryDiagnosis": "d",
            "suggestedMedication": "m",
            "suggestedSpecialist": "Dermatologist",
            "suggestedDoctors": [
                {"name": "Dr. Rajesh Kumar", "specialty": "Dermatologist", "hospital": "Vaidya Apollo Hospital"}
            ]
        }));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(keys(&json), declared(&RECORD_ANALYSIS, true));
        assert_eq!(json["suggestedDoctors"][0]["hospital"], "Vaidya Apollo Hospital");
    }

    #[test]
    fn voice_and_report_map_nested_lists() {
        let voice: VoiceAnalysis = conform(json!({
            "transcribedSymptoms": "dry cough for three days",
            "possibleCauses": [{"name": "Bronchitis", "description": "airway inflammation"}],
            "suggestedNextSteps": ["Steam inhalation"],
            "urgency": "High - Seek immediate medical attention"
        }));
        assert_eq!(voice.possible_causes[0].name, "Bronchitis");
        assert_eq!(voice.urgency_level(), UrgencyLevel::High);

        let report: ReportAnalysis = conform(json!({
            "analysis": "Low haemoglobin",
            "suggestedMedication": [
                {"name": "Ferrous sulfate", "dosage": "325mg", "frequency": "Once a day", "reason": "iron deficiency"}
            ]
        }));
        assert_eq!(report.suggested_medication[0].frequency, "Once a day");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(keys(&json), declared(&REPORT_ANALYSIS, true));
    }

    #[test]
    fn urgency_buckets() {
        assert_eq!(UrgencyLevel::parse("Low - Monitor symptoms"), UrgencyLevel::Low);
        assert_eq!(UrgencyLevel::parse("  high: go to A&E"), UrgencyLevel::High);
        assert_eq!(UrgencyLevel::parse("MEDIUM"), UrgencyLevel::Medium);
        assert_eq!(UrgencyLevel::parse("Lowish"), UrgencyLevel::Unknown);
        assert_eq!(UrgencyLevel::parse(""), UrgencyLevel::Unknown);
    }

    #[test]
    fn mismatched_shape_is_schema_error() {
        let mut answer = Map::new();
        answer.insert("preliminaryAdvice".into(), json!("Rest"));
        let err = normalize::<HealthAdvice>(answer).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(m) if m.contains("HealthAdvice")));
    }
}
