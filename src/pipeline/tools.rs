//! Tools the model may call mid-answer.
//!
//! The set is closed: each declaration pairs a typed input with a typed output,
//! and model requests are parsed into `ToolCall` before anything runs. Every
//! tool is a read-only lookup.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{ResponseSchema, FIND_DOCTORS_INPUT};
use super::PipelineError;
use crate::directory::DoctorDirectory;
use crate::llm::{ToolInvocation, ToolSpec};
use crate::models::DoctorRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolDeclaration {
    /// Look up clinic doctors by exact specialty.
    FindDoctors,
}

impl ToolDeclaration {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FindDoctors => "getDoctorsBySpecialty",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::FindDoctors => {
                "Find doctors at the clinic with the given specialty. \
                 Returns a list of doctors with name, specialty and hospital; the list may be empty."
            }
        }
    }

    pub fn input_schema(&self) -> &'static ResponseSchema {
        match self {
            Self::FindDoctors => &FIND_DOCTORS_INPUT,
        }
    }

    /// Vendor-neutral declaration handed to the backend.
    pub fn spec(&self) -> ToolSpec {
        let schema = self.input_schema();
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: schema.to_json_schema(),
            gemini_parameters: schema.to_gemini_schema(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindDoctorsInput {
    pub specialty: String,
}

/// A model tool request that names a declared tool with well-formed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    FindDoctors(FindDoctorsInput),
}

impl ToolCall {
    /// Check `invocation` against `declared`.
    ///
    /// Unknown tool names and arguments that do not match the input schema are
    /// a schema mismatch: the model did not follow the declaration.
    pub fn parse(
        invocation: &ToolInvocation,
        declared: &[ToolDeclaration],
    ) -> Result<Self, PipelineError> {
        let tool = declared
            .iter()
            .find(|t| t.name() == invocation.name)
            .ok_or_else(|| {
                PipelineError::SchemaMismatch(format!("undeclared tool '{}'", invocation.name))
            })?;

        // Some models send arguments as a JSON-encoded string.
        let arguments = match &invocation.arguments {
            Value::String(s) => serde_json::from_str(s).map_err(|e| {
                PipelineError::SchemaMismatch(format!("{} arguments: {e}", tool.name()))
            })?,
            other => other.clone(),
        };
        let conformed = tool.input_schema().conform(&arguments).map_err(|v| {
            PipelineError::SchemaMismatch(format!("{} arguments: {v}", tool.name()))
        })?;

        match tool {
            ToolDeclaration::FindDoctors => {
                let input: FindDoctorsInput = serde_json::from_value(Value::Object(conformed))
                    .map_err(|e| PipelineError::SchemaMismatch(e.to_string()))?;
                Ok(Self::FindDoctors(input))
            }
        }
    }

    pub fn declaration(&self) -> ToolDeclaration {
        match self {
            Self::FindDoctors(_) => ToolDeclaration::FindDoctors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Doctors(Vec<DoctorRecord>),
}

impl ToolOutput {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Doctors(doctors) => serde_json::to_value(doctors).unwrap_or(Value::Array(Vec::new())),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Doctors(doctors) => doctors.is_empty(),
        }
    }
}

/// Run a parsed tool call.
///
/// Directory failures never propagate: the tool answers with an empty list so
/// the model can still produce a best-effort final answer.
pub async fn execute<D: DoctorDirectory>(call: &ToolCall, directory: &D) -> ToolOutput {
    match call {
        ToolCall::FindDoctors(input) => {
            let specialty = input.specialty.trim();
            match directory.find_by_specialty(specialty).await {
                Ok(doctors) => {
                    tracing::debug!(specialty, found = doctors.len(), "Doctor lookup complete");
                    ToolOutput::Doctors(doctors.into_iter().map(DoctorRecord::from).collect())
                }
                Err(e) => {
                    tracing::warn!(specialty, error = %e, "Doctor lookup failed, returning no doctors");
                    ToolOutput::Doctors(Vec::new())
                }
            }
        }
    }
}
