use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::llm::RetryPolicy;

/// Application-level constants
pub const APP_NAME: &str = "Swasth Sahayak";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Language used when neither the request nor the context names one.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Languages the clinic UI ships translations for.
pub const SUPPORTED_LANGUAGES: &[&str] = &["English", "Hindi", "Kannada", "Tamil"];

/// Log filter applied when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "swasth_sahayak_lib=info,swasth_sahayak=info,warn"
}

/// Get the application data directory
/// ~/SwasthSahayak/ on all platforms
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("SwasthSahayak")
}

/// Default location of the local doctor directory database
pub fn default_directory_path() -> PathBuf {
    app_data_dir().join("doctors.db")
}

/// Which model service answers prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local Ollama instance (images only, no audio/PDF).
    Ollama,
    /// Hosted Gemini `generateContent` API.
    Gemini,
}

/// Where doctor records are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    /// Built-in clinic roster.
    Memory,
    /// Local SQLite database at `directory_path`.
    Sqlite,
    /// Hosted Firestore `doctors` collection.
    Firestore,
}

/// Runtime configuration, assembled from `SWASTH_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub ollama_url: String,
    pub ollama_model: String,
    pub gemini_url: String,
    pub gemini_model: String,
    pub gemini_tts_model: String,
    pub gemini_voice: String,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    /// Per HTTP call.
    pub http_timeout_secs: u64,
    /// Whole entry point, including retries and tool round-trips.
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub directory: DirectoryKind,
    pub directory_path: PathBuf,
    pub firestore_url: String,
    pub firestore_project: Option<String>,
    /// Sent as `key=` on Firestore queries. Never shared with the model backend.
    #[serde(skip_serializing)]
    pub firestore_api_key: Option<String>,
    pub default_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            ollama_url: "http://localhost:11434".into(),
            ollama_model: "dcarrascosa/medgemma-1.5-4b-it".into(),
            gemini_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            gemini_model: "gemini-2.0-flash".into(),
            gemini_tts_model: "gemini-2.5-flash-preview-tts".into(),
            gemini_voice: "Algenib".into(),
            gemini_api_key: None,
            http_timeout_secs: 60,
            request_timeout_secs: 120,
            retry: RetryPolicy::default(),
            directory: DirectoryKind::Memory,
            directory_path: default_directory_path(),
            firestore_url: "https://firestore.googleapis.com/v1".into(),
            firestore_project: None,
            firestore_api_key: None,
            default_language: DEFAULT_LANGUAGE.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must be set for the selected backend")]
    Missing(&'static str),
}

impl AppConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (testable without touching the environment).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("SWASTH_BACKEND") {
            config.backend = match v.to_ascii_lowercase().as_str() {
                "ollama" => BackendKind::Ollama,
                "gemini" => BackendKind::Gemini,
                _ => return Err(ConfigError::InvalidValue { key: "SWASTH_BACKEND", value: v }),
            };
        }
        if let Some(v) = lookup("SWASTH_OLLAMA_URL") {
            config.ollama_url = v;
        }
        if let Some(v) = lookup("SWASTH_OLLAMA_MODEL") {
            config.ollama_model = v;
        }
        if let Some(v) = lookup("SWASTH_GEMINI_URL") {
            config.gemini_url = v;
        }
        if let Some(v) = lookup("SWASTH_GEMINI_MODEL") {
            config.gemini_model = v;
        }
        if let Some(v) = lookup("SWASTH_GEMINI_TTS_MODEL") {
            config.gemini_tts_model = v;
        }
        if let Some(v) = lookup("SWASTH_GEMINI_VOICE") {
            config.gemini_voice = v;
        }
        config.gemini_api_key = lookup("SWASTH_GEMINI_API_KEY").or_else(|| lookup("GEMINI_API_KEY"));

        if let Some(v) = lookup("SWASTH_HTTP_TIMEOUT_SECS") {
            config.http_timeout_secs = parse_number("SWASTH_HTTP_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("SWASTH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_number("SWASTH_REQUEST_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("SWASTH_MAX_RETRIES") {
            config.retry.max_retries = parse_number("SWASTH_MAX_RETRIES", v)?;
        }

        if let Some(v) = lookup("SWASTH_DIRECTORY") {
            config.directory = match v.to_ascii_lowercase().as_str() {
                "memory" => DirectoryKind::Memory,
                "sqlite" => DirectoryKind::Sqlite,
                "firestore" => DirectoryKind::Firestore,
                _ => return Err(ConfigError::InvalidValue { key: "SWASTH_DIRECTORY", value: v }),
            };
        }
        if let Some(v) = lookup("SWASTH_DIRECTORY_PATH") {
            config.directory_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SWASTH_FIRESTORE_URL") {
            config.firestore_url = v;
        }
        config.firestore_project = lookup("SWASTH_FIRESTORE_PROJECT");
        config.firestore_api_key = lookup("SWASTH_FIRESTORE_API_KEY");
        if let Some(v) = lookup("SWASTH_LANGUAGE") {
            config.default_language = v;
        }

        if config.backend == BackendKind::Gemini && config.gemini_api_key.is_none() {
            return Err(ConfigError::Missing("SWASTH_GEMINI_API_KEY"));
        }
        if config.directory == DirectoryKind::Firestore && config.firestore_project.is_none() {
            return Err(ConfigError::Missing("SWASTH_FIRESTORE_PROJECT"));
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
