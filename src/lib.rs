pub mod config;
pub mod directory;
pub mod llm;
pub mod models;
pub mod pipeline;

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use config::{AppConfig, BackendKind, ConfigError, DirectoryKind};
use directory::{AnyDirectory, DirectoryError, FirestoreDirectory, InMemoryDirectory, SqliteDirectory};
use llm::{AnyBackend, GeminiBackend, LlmError, OllamaBackend};
use pipeline::{HealthAssistant, RequestContext};

/// Everything that can stop the assistant from being assembled.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Model backend: {0}")]
    Backend(#[from] LlmError),

    #[error("Doctor directory: {0}")]
    Directory(#[from] DirectoryError),
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn build_backend(config: &AppConfig) -> Result<AnyBackend, StartupError> {
    let backend = match config.backend {
        BackendKind::Ollama => AnyBackend::Ollama(OllamaBackend::new(
            &config.ollama_url,
            &config.ollama_model,
            config.http_timeout_secs,
        )?),
        BackendKind::Gemini => {
            let key = config
                .gemini_api_key
                .as_deref()
                .ok_or(ConfigError::Missing("SWASTH_GEMINI_API_KEY"))?;
            AnyBackend::Gemini(GeminiBackend::new(
                &config.gemini_url,
                key,
                &config.gemini_model,
                &config.gemini_tts_model,
                &config.gemini_voice,
                config.http_timeout_secs,
            )?)
        }
    };
    Ok(backend)
}

pub fn build_directory(config: &AppConfig) -> Result<AnyDirectory, StartupError> {
    let directory = match config.directory {
        DirectoryKind::Memory => AnyDirectory::Memory(InMemoryDirectory::seeded()),
        DirectoryKind::Sqlite => {
            let db = SqliteDirectory::open(&config.directory_path)?;
            db.seed_if_empty(&models::seed_doctors())?;
            AnyDirectory::Sqlite(db)
        }
        DirectoryKind::Firestore => {
            let project = config
                .firestore_project
                .as_deref()
                .ok_or(ConfigError::Missing("SWASTH_FIRESTORE_PROJECT"))?;
            AnyDirectory::Firestore(FirestoreDirectory::new(
                &config.firestore_url,
                project,
                config.firestore_api_key.clone(),
                config.http_timeout_secs,
            )?)
        }
    };
    Ok(directory)
}

/// Assemble the assistant described by `config`.
pub fn build_assistant(
    config: &AppConfig,
) -> Result<HealthAssistant<AnyBackend, AnyDirectory>, StartupError> {
    if !config::SUPPORTED_LANGUAGES.contains(&config.default_language.as_str()) {
        tracing::warn!(
            language = %config.default_language,
            "Default language has no UI translation"
        );
    }

    let backend = build_backend(config)?;
    let directory = build_directory(config)?;
    tracing::info!(
        backend = ?config.backend,
        directory = ?config.directory,
        language = %config.default_language,
        "Assistant configured"
    );

    Ok(HealthAssistant::new(backend, directory)
        .with_retry(config.retry)
        .with_context(RequestContext::new(config.default_language.clone()))
        .with_request_timeout(Duration::from_secs(config.request_timeout_secs)))
}
