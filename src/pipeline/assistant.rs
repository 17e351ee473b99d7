//! Caller-facing entry points.
//!
//! Every entry point validates, renders, invokes (with the tool loop where the
//! feature declares tools) and normalizes, then folds the outcome into an
//! `Envelope`. No error escapes as anything other than a failure envelope.
//! Each call runs in its own span with a fresh request id and under an overall
//! deadline; dropping the returned future cancels any in-flight HTTP call.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::invoke::ModelInvoker;
use super::normalize::{
    normalize, FeatureResult, HealthAdvice, ImageDiagnosis, RecordAnalysis, ReportAnalysis,
    VoiceAnalysis,
};
use super::prompt::{self, PromptTemplate};
use super::schema::ResponseSchema;
use super::request::{
    to_raw, AnalysisRequest, Feature, ImageDiagnosisRequest, RecordAnalysisRequest,
    ReportAnalysisRequest, RequestContext, SpeechRequest, SymptomAdviceRequest,
    VoiceAnalysisRequest,
};
use super::speech::{advice_narration, voice_narration, wav_data_uri, SpeechAudio};
use super::tool_loop::{run_tool_loop, LoopOutcome};
use super::tools::{ToolDeclaration, ToolOutput};
use super::validation::{self, InputSchema};
use super::PipelineError;
use crate::directory::DoctorDirectory;
use crate::llm::{ModelBackend, RetryPolicy};
use crate::models::DoctorRecord;

/// Overall deadline for one entry-point call, retries and tool turns included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shown for transient and service-availability failures.
pub const TRY_AGAIN_MESSAGE: &str =
    "The analysis service is temporarily unavailable. Please try again in a moment.";

/// Uniform success/failure shape returned to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn from_result(feature: Feature, result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(user_message(feature, &e)),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.data, self.error) {
            (Some(data), _) if self.success => Ok(data),
            (_, error) => Err(error.unwrap_or_default()),
        }
    }
}

/// Caller-facing wording for a failure.
///
/// Validation messages are shown verbatim; everything else is replaced by a
/// generic message so model output and internals never reach the UI.
pub fn user_message(feature: Feature, err: &PipelineError) -> String {
    match err {
        PipelineError::Validation(v) => v.to_string(),
        PipelineError::Transient(_) | PipelineError::ServiceUnavailable(_) => {
            TRY_AGAIN_MESSAGE.to_string()
        }
        PipelineError::SchemaMismatch(_) | PipelineError::Internal(_) => {
            failure_message(feature).to_string()
        }
    }
}

fn failure_message(feature: Feature) -> &'static str {
    match feature {
        Feature::SymptomAdvice => "An unexpected error occurred. Please try again.",
        Feature::ImageDiagnosis => "An unexpected error occurred while analyzing the image.",
        Feature::VoiceAnalysis => "An unexpected error occurred while analyzing your recording.",
        Feature::RecordAnalysis => "An unexpected error occurred while analyzing the health record.",
        Feature::ReportAnalysis => "An unexpected error occurred while analyzing the health report.",
        Feature::TextToSpeech => "An unexpected error occurred while generating audio.",
    }
}

/// Static wiring of one analysis feature.
struct FeaturePlan {
    input: &'static InputSchema,
    template: &'static PromptTemplate,
    tools: &'static [ToolDeclaration],
}

fn plan(feature: Feature) -> Option<FeaturePlan> {
    let plan = match feature {
        Feature::SymptomAdvice => FeaturePlan {
            input: &validation::SYMPTOM_ADVICE_INPUT,
            template: &prompt::SYMPTOM_ADVICE_PROMPT,
            tools: &[],
        },
        Feature::ImageDiagnosis => FeaturePlan {
            input: &validation::IMAGE_DIAGNOSIS_INPUT,
            template: &prompt::IMAGE_DIAGNOSIS_PROMPT,
            tools: &[],
        },
        Feature::VoiceAnalysis => FeaturePlan {
            input: &validation::VOICE_ANALYSIS_INPUT,
            template: &prompt::VOICE_ANALYSIS_PROMPT,
            tools: &[],
        },
        Feature::RecordAnalysis => FeaturePlan {
            input: &validation::RECORD_ANALYSIS_INPUT,
            template: &prompt::RECORD_ANALYSIS_PROMPT,
            tools: &[ToolDeclaration::FindDoctors],
        },
        Feature::ReportAnalysis => FeaturePlan {
            input: &validation::REPORT_ANALYSIS_INPUT,
            template: &prompt::REPORT_ANALYSIS_PROMPT,
            tools: &[],
        },
        Feature::TextToSpeech => return None,
    };
    Some(plan)
}

/// Keep the doctors the model listed that the lookup tool actually returned.
///
/// Never adds doctors the model left out; an omitted field stays omitted.
fn keep_returned_doctors(
    listed: Option<Vec<DoctorRecord>>,
    outputs: &[ToolOutput],
) -> Option<Vec<DoctorRecord>> {
    let listed = listed?;
    let returned = |doctor: &DoctorRecord| {
        outputs.iter().any(|output| {
            let ToolOutput::Doctors(found) = output;
            found.contains(doctor)
        })
    };

    let total = listed.len();
    let kept: Vec<DoctorRecord> = listed.into_iter().filter(|d| returned(d)).collect();
    if kept.len() < total {
        tracing::warn!(dropped = total - kept.len(), "Dropping suggested doctors the lookup tool did not return");
    }
    (total == 0 || !kept.is_empty()).then_some(kept)
}

/// The structured AI request pipeline behind every feature.
pub struct HealthAssistant<B, D> {
    invoker: ModelInvoker<B>,
    directory: D,
    context: RequestContext,
    request_timeout: Duration,
}

impl<B: ModelBackend, D: DoctorDirectory> HealthAssistant<B, D> {
    pub fn new(backend: B, directory: D) -> Self {
        Self {
            invoker: ModelInvoker::new(backend, RetryPolicy::default()),
            directory,
            context: RequestContext::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.invoker.set_retry_policy(retry);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &B {
        self.invoker.backend()
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    // ── Entry points ────────────────────────────────────────

    pub async fn symptom_advice(&self, request: SymptomAdviceRequest) -> Envelope<HealthAdvice> {
        self.run(Feature::SymptomAdvice, async {
            self.analyze(Feature::SymptomAdvice, to_raw(&request)?).await
        })
        .await
    }

    pub async fn image_diagnosis(&self, request: ImageDiagnosisRequest) -> Envelope<ImageDiagnosis> {
        self.run(Feature::ImageDiagnosis, async {
            self.analyze(Feature::ImageDiagnosis, to_raw(&request)?).await
        })
        .await
    }

    pub async fn voice_analysis(&self, request: VoiceAnalysisRequest) -> Envelope<VoiceAnalysis> {
        self.run(Feature::VoiceAnalysis, async {
            self.analyze(Feature::VoiceAnalysis, to_raw(&request)?).await
        })
        .await
    }

    pub async fn analyze_record(&self, request: RecordAnalysisRequest) -> Envelope<RecordAnalysis> {
        self.run(Feature::RecordAnalysis, async {
            self.record_analysis(to_raw(&request)?).await
        })
        .await
    }

    pub async fn analyze_report(&self, request: ReportAnalysisRequest) -> Envelope<ReportAnalysis> {
        self.run(Feature::ReportAnalysis, async {
            self.analyze(Feature::ReportAnalysis, to_raw(&request)?).await
        })
        .await
    }

    pub async fn text_to_speech(&self, request: SpeechRequest) -> Envelope<SpeechAudio> {
        self.run(Feature::TextToSpeech, async {
            self.speech(to_raw(&request)?).await
        })
        .await
    }

    /// Read symptom advice aloud.
    pub async fn narrate_advice(&self, advice: &HealthAdvice) -> Envelope<SpeechAudio> {
        self.text_to_speech(SpeechRequest {
            text: advice_narration(advice),
        })
        .await
    }

    /// Read a voice analysis aloud.
    pub async fn narrate_voice_analysis(&self, analysis: &VoiceAnalysis) -> Envelope<SpeechAudio> {
        self.text_to_speech(SpeechRequest {
            text: voice_narration(analysis),
        })
        .await
    }

    /// Run any tagged request; the result is returned as JSON.
    pub async fn handle(&self, request: AnalysisRequest) -> Envelope<Value> {
        let feature = request.feature();
        self.run(feature, async { self.dispatch(feature, request.to_raw()?).await })
            .await
    }

    /// Run `feature` on an untyped JSON request, as read from the wire.
    pub async fn handle_raw(&self, feature: Feature, raw: Value) -> Envelope<Value> {
        self.run(feature, self.dispatch(feature, raw)).await
    }

    // ── Pipeline ────────────────────────────────────────────

    async fn run<T, F>(&self, feature: Feature, work: F) -> Envelope<T>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "analysis",
            feature = feature.as_str(),
            %request_id,
            backend = self.invoker.backend().name()
        );

        async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(self.request_timeout, work).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Transient(format!(
                    "request exceeded {} ms",
                    self.request_timeout.as_millis()
                ))),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(_) => tracing::info!(elapsed_ms, "Analysis complete"),
                Err(PipelineError::Validation(e)) => {
                    let fields: Vec<&str> = e.fields().collect();
                    tracing::info!(elapsed_ms, ?fields, "Request rejected")
                }
                Err(e) => tracing::warn!(elapsed_ms, kind = e.kind(), error = %e, "Analysis failed"),
            }
            Envelope::from_result(feature, result)
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, feature: Feature, raw: Value) -> Result<Value, PipelineError> {
        let value = match feature {
            Feature::SymptomAdvice => {
                serde_json::to_value(self.analyze::<HealthAdvice>(feature, raw).await?)
            }
            Feature::ImageDiagnosis => {
                serde_json::to_value(self.analyze::<ImageDiagnosis>(feature, raw).await?)
            }
            Feature::VoiceAnalysis => {
                serde_json::to_value(self.analyze::<VoiceAnalysis>(feature, raw).await?)
            }
            Feature::RecordAnalysis => serde_json::to_value(self.record_analysis(raw).await?),
            Feature::ReportAnalysis => {
                serde_json::to_value(self.analyze::<ReportAnalysis>(feature, raw).await?)
            }
            Feature::TextToSpeech => serde_json::to_value(self.speech(raw).await?),
        };
        value.map_err(|e| PipelineError::Internal(e.to_string()))
    }

    /// validate → render → invoke (+ tool loop) for one analysis feature.
    async fn run_plan(
        &self,
        feature: Feature,
        raw: Value,
        schema: &'static ResponseSchema,
    ) -> Result<LoopOutcome, PipelineError> {
        let plan = plan(feature).ok_or_else(|| {
            PipelineError::Internal(format!("{feature} has no analysis plan"))
        })?;

        let request = validation::validate(&raw, plan.input, &self.context)?;
        tracing::debug!(language = request.language(), "Request validated");

        let prompt = prompt::render(plan.template, plan.input, &request)?;
        run_tool_loop(
            &self.invoker,
            &self.directory,
            prompt.into_messages(),
            schema,
            plan.tools,
        )
        .await
    }

    async fn analyze<T: FeatureResult>(&self, feature: Feature, raw: Value) -> Result<T, PipelineError> {
        let outcome = self.run_plan(feature, raw, T::SCHEMA).await?;
        normalize(outcome.answer)
    }

    /// Record analysis passes `suggestedDoctors` through, minus any doctor the
    /// lookup tool never returned.
    async fn record_analysis(&self, raw: Value) -> Result<RecordAnalysis, PipelineError> {
        let outcome = self
            .run_plan(Feature::RecordAnalysis, raw, RecordAnalysis::SCHEMA)
            .await?;
        let mut record: RecordAnalysis = normalize(outcome.answer)?;
        record.suggested_doctors =
            keep_returned_doctors(record.suggested_doctors.take(), &outcome.tool_outputs);
        Ok(record)
    }

    async fn speech(&self, raw: Value) -> Result<SpeechAudio, PipelineError> {
        let request = validation::validate(&raw, &validation::SPEECH_INPUT, &self.context)?;
        let text = request
            .text("text")
            .ok_or_else(|| PipelineError::Internal("validated speech request has no text".into()))?;

        let pcm = self.invoker.speak(text).await?;
        tracing::debug!(sample_rate = pcm.sample_rate, bytes = pcm.data.len(), "Speech synthesized");
        wav_data_uri(&pcm)
    }
}
