//! Declared output shapes.
//!
//! A `ResponseSchema` is an ordered field list. It is exported to the model in
//! both JSON-Schema dialects and then used to check the model's answer: every
//! required field must be present and correctly typed, optional fields that
//! are absent or null are dropped, and undeclared keys are discarded.

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::PipelineError;
use crate::llm::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    String,
    /// A number in `0.0..=1.0`.
    Fraction,
    StringList,
    ObjectList(&'static [FieldSpec]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// First place where a value departs from its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{path}' {problem}")]
pub struct SchemaViolation {
    pub path: String,
    pub problem: String,
}

impl From<SchemaViolation> for PipelineError {
    fn from(v: SchemaViolation) -> Self {
        PipelineError::SchemaMismatch(v.to_string())
    }
}

// ──────────────────────────────────────────────
// Per-feature schemas
// ──────────────────────────────────────────────

const URGENCY_DESCRIPTION: &str = "Urgency assessment starting with Low, Medium or High, e.g. \
\"Low - Monitor symptoms\", \"Medium - See a doctor within 24 hours\", \
\"High - Seek immediate medical attention\".";

pub const HEALTH_ADVICE: ResponseSchema = ResponseSchema {
    name: "HealthAdvice",
    fields: &[
        FieldSpec::required(
            "preliminaryAdvice",
            FieldKind::String,
            "General health advice for the described symptoms.",
        ),
        FieldSpec::required(
            "possibleConditions",
            FieldKind::StringList,
            "Conditions that could cause the symptoms.",
        ),
        FieldSpec::required(
            "suggestedActions",
            FieldKind::StringList,
            "Actions the patient can take, e.g. \"Rest\", \"Drink fluids\".",
        ),
        FieldSpec::required("urgency", FieldKind::String, URGENCY_DESCRIPTION),
    ],
};

pub const IMAGE_DIAGNOSIS: ResponseSchema = ResponseSchema {
    name: "ImageDiagnosis",
    fields: &[
        FieldSpec::required("diagnosis", FieldKind::String, "Preliminary diagnosis of the condition."),
        FieldSpec::required(
            "confidenceScore",
            FieldKind::Fraction,
            "Confidence in the diagnosis, from 0 to 1 (e.g. 0.85).",
        ),
        FieldSpec::required(
            "detailedDescription",
            FieldKind::String,
            "What the image shows and how it supports the diagnosis.",
        ),
        FieldSpec::required(
            "severity",
            FieldKind::String,
            "Severity of the condition, e.g. mild, moderate, severe.",
        ),
        FieldSpec::required(
            "commonSymptoms",
            FieldKind::StringList,
            "Symptoms commonly associated with the condition.",
        ),
        FieldSpec::required(
            "recommendation",
            FieldKind::String,
            "Whether to seek professional care, and next steps.",
        ),
    ],
};

const POSSIBLE_CAUSE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::String, "Name of the possible condition."),
    FieldSpec::required(
        "description",
        FieldKind::String,
        "Short description of the condition and why it may be relevant.",
    ),
];

pub const VOICE_ANALYSIS: ResponseSchema = ResponseSchema {
    name: "VoiceAnalysis",
    fields: &[
        FieldSpec::required(
            "transcribedSymptoms",
            FieldKind::String,
            "Transcript of the symptoms described in the recording.",
        ),
        FieldSpec::required(
            "possibleCauses",
            FieldKind::ObjectList(POSSIBLE_CAUSE_FIELDS),
            "Possible causes of the described symptoms.",
        ),
        FieldSpec::required(
            "suggestedNextSteps",
            FieldKind::StringList,
            "Next steps for the patient.",
        ),
        FieldSpec::required("urgency", FieldKind::String, URGENCY_DESCRIPTION),
    ],
};

pub const DOCTOR_RECORD_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::String, "Doctor's full name."),
    FieldSpec::required("specialty", FieldKind::String, "Medical specialty."),
    FieldSpec::required("hospital", FieldKind::String, "Hospital or clinic."),
];

pub const RECORD_ANALYSIS: ResponseSchema = ResponseSchema {
    name: "RecordAnalysis",
    fields: &[
        FieldSpec::required("summary", FieldKind::String, "Short summary of the health record."),
        FieldSpec::required(
            "keyFindings",
            FieldKind::StringList,
            "Key findings from the record.",
        ),
        FieldSpec::required(
            "preliminaryDiagnosis",
            FieldKind::String,
            "Preliminary diagnosis based on the record.",
        ),
        FieldSpec::required(
            "suggestedMedication",
            FieldKind::String,
            "Medication that may be appropriate, pending a doctor's review.",
        ),
        FieldSpec::required(
            "suggestedSpecialist",
            FieldKind::String,
            "Type of specialist the patient should see, e.g. Cardiologist.",
        ),
        FieldSpec::optional(
            "suggestedDoctors",
            FieldKind::ObjectList(DOCTOR_RECORD_FIELDS),
            "Clinic doctors returned by the doctor lookup tool. Omit if the tool found none.",
        ),
    ],
};

const MEDICATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::String, "Name of the medication."),
    FieldSpec::required("dosage", FieldKind::String, "Dosage, e.g. \"500mg\", \"1 tablet\"."),
    FieldSpec::required(
        "frequency",
        FieldKind::String,
        "How often to take it, e.g. \"Twice daily\".",
    ),
    FieldSpec::required(
        "reason",
        FieldKind::String,
        "Why the report suggests this medication.",
    ),
];

pub const REPORT_ANALYSIS: ResponseSchema = ResponseSchema {
    name: "ReportAnalysis",
    fields: &[
        FieldSpec::required(
            "analysis",
            FieldKind::String,
            "Detailed summary and analysis of the key findings in the report.",
        ),
        FieldSpec::required(
            "suggestedMedication",
            FieldKind::ObjectList(MEDICATION_FIELDS),
            "Medications suggested by the analysis.",
        ),
    ],
};

pub const FIND_DOCTORS_INPUT: ResponseSchema = ResponseSchema {
    name: "FindDoctorsInput",
    fields: &[FieldSpec::required(
        "specialty",
        FieldKind::String,
        "Specialty to search for, e.g. Cardiologist or Dermatologist.",
    )],
};

// ──────────────────────────────────────────────
// Export
// ──────────────────────────────────────────────

impl FieldKind {
    fn json_schema(&self, description: &str) -> Value {
        match self {
            Self::String => json!({ "type": "string", "description": description }),
            Self::Fraction => json!({
                "type": "number", "minimum": 0, "maximum": 1, "description": description
            }),
            Self::StringList => json!({
                "type": "array", "items": { "type": "string" }, "description": description
            }),
            Self::ObjectList(fields) => json!({
                "type": "array",
                "items": object_json_schema(fields),
                "description": description
            }),
        }
    }

    fn gemini_schema(&self, description: &str) -> Value {
        match self {
            Self::String => json!({ "type": "STRING", "description": description }),
            Self::Fraction => json!({
                "type": "NUMBER", "minimum": 0, "maximum": 1, "description": description
            }),
            Self::StringList => json!({
                "type": "ARRAY", "items": { "type": "STRING" }, "description": description
            }),
            Self::ObjectList(fields) => json!({
                "type": "ARRAY",
                "items": object_gemini_schema(fields),
                "description": description
            }),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Fraction => "number from 0 to 1",
            Self::StringList => "list of strings",
            Self::ObjectList(_) => "list of objects",
        }
    }
}

fn required_names(fields: &[FieldSpec]) -> Vec<&'static str> {
    fields.iter().filter(|f| f.required).map(|f| f.name).collect()
}

fn object_json_schema(fields: &[FieldSpec]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.to_string(), f.kind.json_schema(f.description)))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required_names(fields),
    })
}

fn object_gemini_schema(fields: &[FieldSpec]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.to_string(), f.kind.gemini_schema(f.description)))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required_names(fields),
        "propertyOrdering": fields.iter().map(|f| f.name).collect::<Vec<_>>(),
    })
}

impl ResponseSchema {
    /// Standard lowercase JSON Schema.
    pub fn to_json_schema(&self) -> Value {
        object_json_schema(self.fields)
    }

    /// Gemini's OpenAPI subset: uppercase type names plus `propertyOrdering`.
    pub fn to_gemini_schema(&self) -> Value {
        object_gemini_schema(self.fields)
    }

    /// Key list for prompts, used when the backend cannot enforce the schema.
    pub fn instructions(&self) -> String {
        let mut out = String::from(
            "Reply with a single JSON object and nothing else. Write every string value in the \
             requested language. Use these keys:",
        );
        for field in self.fields {
            write_field_line(&mut out, field, 0);
        }
        out
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat {
            json_schema: self.to_json_schema(),
            gemini_schema: self.to_gemini_schema(),
            instructions: self.instructions(),
        }
    }

    /// Check `value` against this schema and return the declared fields only.
    pub fn conform(&self, value: &Value) -> Result<Map<String, Value>, SchemaViolation> {
        conform_object(self.fields, value, "")
    }
}

fn write_field_line(out: &mut String, field: &FieldSpec, depth: usize) {
    let indent = "  ".repeat(depth);
    let optional = if field.required { "" } else { ", optional" };
    out.push_str(&format!(
        "\n{indent}- {} ({}{optional}): {}",
        field.name,
        field.kind.label(),
        field.description
    ));
    if let FieldKind::ObjectList(inner) = field.kind {
        for f in inner {
            write_field_line(out, f, depth + 1);
        }
    }
}

fn violation(path: String, problem: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        path,
        problem: problem.into(),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn conform_object(
    fields: &[FieldSpec],
    value: &Value,
    prefix: &str,
) -> Result<Map<String, Value>, SchemaViolation> {
    let object = value.as_object().ok_or_else(|| {
        let path = if prefix.is_empty() { "$" } else { prefix };
        violation(path.to_string(), "is not a JSON object")
    })?;

    let mut out = Map::new();
    for field in fields {
        let path = join_path(prefix, field.name);
        match object.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(violation(path, "is required but missing"));
            }
            None | Some(Value::Null) => {}
            Some(v) => {
                let conformed = conform_value(&field.kind, v, &path)?;
                out.insert(field.name.to_string(), conformed);
            }
        }
    }
    Ok(out)
}

fn conform_value(kind: &FieldKind, value: &Value, path: &str) -> Result<Value, SchemaViolation> {
    let wrong_type = || violation(path.to_string(), format!("must be a {}", kind.label()));

    match kind {
        FieldKind::String => value.as_str().map(|_| value.clone()).ok_or_else(wrong_type),
        FieldKind::Fraction => match value.as_f64() {
            Some(n) if (0.0..=1.0).contains(&n) => Ok(value.clone()),
            _ => Err(wrong_type()),
        },
        FieldKind::StringList => {
            let items = value.as_array().ok_or_else(wrong_type)?;
            if items.iter().all(Value::is_string) {
                Ok(value.clone())
            } else {
                Err(wrong_type())
            }
        }
        FieldKind::ObjectList(fields) => {
            let items = value.as_array().ok_or_else(wrong_type)?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| conform_object(fields, item, &format!("{path}[{i}]")).map(Value::Object))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advice() -> Value {
        json!({
            "preliminaryAdvice": "Rest and hydrate.",
            "possibleConditions": ["Common cold", "Flu"],
            "suggestedActions": ["Rest", "Drink fluids"],
            "urgency": "Low - Monitor symptoms"
        })
    }

    #[test]
    fn valid_answer_conforms() {
        let out = HEALTH_ADVICE.conform(&advice()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out["urgency"], "Low - Monitor symptoms");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut answer = advice();
        answer.as_object_mut().unwrap().remove("urgency");
        let err = HEALTH_ADVICE.conform(&answer).unwrap_err();
        assert_eq!(err.path, "urgency");
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn null_required_field_is_rejected() {
        let mut answer = advice();
        answer["preliminaryAdvice"] = Value::Null;
        assert!(HEALTH_ADVICE.conform(&answer).is_err());
    }

    #[test]
    fn wrong_types_are_rejected() {
        let mut answer = advice();
        answer["possibleConditions"] = json!("Common cold");
        let err = HEALTH_ADVICE.conform(&answer).unwrap_err();
        assert_eq!(err.path, "possibleConditions");
        assert!(err.problem.contains("list of strings"));

        let mut answer = advice();
        answer["suggestedActions"] = json!(["Rest", 3]);
        assert!(HEALTH_ADVICE.conform(&answer).is_err());
    }

    #[test]
    fn extra_keys_are_dropped() {
        let mut answer = advice();
        answer["disclaimer"] = json!("not a doctor");
        let out = HEALTH_ADVICE.conform(&answer).unwrap();
        assert!(!out.contains_key("disclaimer"));
    }

    #[test]
    fn non_object_answer_is_rejected() {
        let err = HEALTH_ADVICE.conform(&json!(["a"])).unwrap_err();
        assert_eq!(err.path, "$");
    }

    #[test]
    fn fraction_must_be_in_range() {
        let answer = json!({
            "diagnosis": "Eczema",
            "confidenceScore": 85,
            "detailedDescription": "Dry patches",
            "severity": "mild",
            "commonSymptoms": ["Itching"],
            "recommendation": "See a dermatologist"
        });
        let err = IMAGE_DIAGNOSIS.conform(&answer).unwrap_err();
        assert_eq!(err.path, "confidenceScore");

        let mut ok = answer;
        ok["confidenceScore"] = json!(0.85);
        assert!(IMAGE_DIAGNOSIS.conform(&ok).is_ok());
    }

    #[test]
    fn optional_absent_or_null_is_omitted() {
        let answer = json!({
            "summary": "s",
            "keyFindings": [],
            "preliminaryDiagnosis": "d",
            "suggestedMedication": "m",
            "suggestedSpecialist": "Cardiologist",
            "suggestedDoctors": null
        });
        let out = RECORD_ANALYSIS.conform(&answer).unwrap();
        assert!(!out.contains_key("suggestedDoctors"));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn nested_objects_are_checked_with_path() {
        let answer = json!({
            "analysis": "a",
            "suggestedMedication": [
                {"name": "Paracetamol", "dosage": "500mg", "frequency": "Twice daily", "reason": "fever"},
                {"name": "Ibuprofen", "dosage": "200mg", "reason": "pain"}
            ]
        });
        let err = REPORT_ANALYSIS.conform(&answer).unwrap_err();
        assert_eq!(err.path, "suggestedMedication[1].frequency");
    }

    #[test]
    fn nested_extras_are_dropped() {
        let answer = json!({
            "transcribedSymptoms": "cough",
            "possibleCauses": [{"name": "Cold", "description": "viral", "likelihood": "high"}],
            "suggestedNextSteps": ["Rest"],
            "urgency": "Low"
        });
        let out = VOICE_ANALYSIS.conform(&answer).unwrap();
        assert!(out["possibleCauses"][0].get("likelihood").is_none());
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let schema = RECORD_ANALYSIS.to_json_schema();
        assert_eq!(schema["type"], "object");
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(required.contains(&"summary"));
        assert!(!required.contains(&"suggestedDoctors"));
        assert_eq!(
            schema["properties"]["suggestedDoctors"]["items"]["properties"]["hospital"]["type"],
            "string"
        );
    }

    #[test]
    fn gemini_schema_uses_uppercase_and_ordering() {
        let schema = VOICE_ANALYSIS.to_gemini_schema();
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["propertyOrdering"][0], "transcribedSymptoms");
        assert_eq!(schema["properties"]["possibleCauses"]["items"]["type"], "OBJECT");
        assert_eq!(schema["properties"]["suggestedNextSteps"]["items"]["type"], "STRING");
    }

    #[test]
    fn instructions_name_every_field() {
        let text = RECORD_ANALYSIS.instructions();
        for field in RECORD_ANALYSIS.fields {
            assert!(text.contains(field.name), "missing {}", field.name);
        }
        assert!(text.contains("suggestedDoctors (list of objects, optional)"));
        assert!(text.contains("\n  - hospital (string)"));
    }
}
