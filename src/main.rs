use std::io::Read;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

use swasth_sahayak_lib::config::{self, AppConfig};
use swasth_sahayak_lib::pipeline::Feature;

/// Reads a JSON request from stdin and writes the response envelope to stdout.
#[derive(Parser)]
#[command(name = "swasth-sahayak", version, about = "Multilingual health assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Advice for described symptoms
    Symptoms,
    /// Diagnose a photo of a visible condition
    Image,
    /// Analyze a recorded voice description
    Voice,
    /// Summarize a medical record and suggest doctors
    Record,
    /// Explain a lab or medical report
    Report,
    /// Speak text aloud as base64 WAV
    Speech,
}

impl From<Command> for Feature {
    fn from(command: Command) -> Self {
        match command {
            Command::Symptoms => Feature::SymptomAdvice,
            Command::Image => Feature::ImageDiagnosis,
            Command::Voice => Feature::VoiceAnalysis,
            Command::Record => Feature::RecordAnalysis,
            Command::Report => Feature::ReportAnalysis,
            Command::Speech => Feature::TextToSpeech,
        }
    }
}

fn read_request() -> Result<Value, String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("Failed to read request from stdin: {e}"))?;
    serde_json::from_str(&input).map_err(|e| format!("Request is not valid JSON: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    swasth_sahayak_lib::init_tracing();
    let feature = Feature::from(cli.command);

    let raw = match read_request() {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let assistant = match swasth_sahayak_lib::build_assistant(&config) {
        Ok(assistant) => assistant,
        Err(e) => {
            eprintln!("Startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("{} v{} handling {feature}", config::APP_NAME, config::APP_VERSION);
    let envelope = assistant.handle_raw(feature, raw).await;

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to encode response: {e}");
            return ExitCode::FAILURE;
        }
    }

    if envelope.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn every_command_maps_to_its_feature() {
        for feature in Feature::ALL {
            let cli = Cli::try_parse_from(["swasth-sahayak", feature.command()]).unwrap();
            assert_eq!(Feature::from(cli.command), feature);
        }
    }

    #[test]
    fn unknown_or_missing_command_is_rejected() {
        assert!(Cli::try_parse_from(["swasth-sahayak", "diagnose"]).is_err());
        assert!(Cli::try_parse_from(["swasth-sahayak"]).is_err());
    }
}
