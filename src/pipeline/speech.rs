//! Text-to-speech: narration text for analysis results, and wrapping the
//! model's raw PCM into a playable WAV data URI.

use serde::{Deserialize, Serialize};

use super::normalize::{HealthAdvice, VoiceAnalysis};
use super::PipelineError;
use crate::llm::PcmAudio;
use crate::models::DataUri;

pub const WAV_MIME: &str = "audio/wav";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechAudio {
    /// `data:audio/wav;base64,...`
    pub audio_data_uri: String,
}

/// Encode PCM samples as a RIFF/WAVE file (44-byte canonical header).
pub fn encode_wav(audio: &PcmAudio) -> Result<Vec<u8>, PipelineError> {
    let data_len = u32::try_from(audio.data.len())
        .ok()
        .filter(|len| *len <= u32::MAX - 36)
        .ok_or_else(|| PipelineError::Internal("audio too long for a WAV container".into()))?;

    let block_align = audio.channels * (audio.bits_per_sample / 8);
    let byte_rate = audio.sample_rate * u32::from(block_align);

    let mut wav = Vec::with_capacity(44 + audio.data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&audio.channels.to_le_bytes());
    wav.extend_from_slice(&audio.sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&audio.bits_per_sample.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(&audio.data);
    Ok(wav)
}

pub fn wav_data_uri(audio: &PcmAudio) -> Result<SpeechAudio, PipelineError> {
    let wav = encode_wav(audio)?;
    Ok(SpeechAudio {
        audio_data_uri: DataUri::from_bytes(WAV_MIME, &wav).to_string(),
    })
}

fn sentence(text: &str) -> &str {
    text.trim().trim_end_matches('.')
}

/// Spoken summary of symptom advice.
pub fn advice_narration(advice: &HealthAdvice) -> String {
    format!(
        "Preliminary advice: {}. Possible conditions: {}. Suggested actions: {}. Urgency: {}.",
        sentence(&advice.preliminary_advice),
        advice.possible_conditions.join(", "),
        advice.suggested_actions.join(", "),
        sentence(&advice.urgency),
    )
}

/// Spoken summary of a voice analysis.
pub fn voice_narration(analysis: &VoiceAnalysis) -> String {
    let causes = analysis
        .possible_causes
        .iter()
        .map(|c| format!("{}: {}", c.name, sentence(&c.description)))
        .collect::<Vec<_>>()
        .join(". ");
    format!(
        "Here is the analysis of your symptoms. First, the possible causes: {causes}. \
         Next, the suggested next steps: {}. Finally, the urgency level is: {}.",
        analysis.suggested_next_steps.join(", "),
        sentence(&analysis.urgency),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::PossibleCause;

    #[test]
    fn wav_header_is_canonical() {
        let pcm = PcmAudio::mono_16bit(24_000, vec![1, 0, 2, 0]);
        let wav = encode_wav(&pcm).unwrap();

        assert_eq!(wav.len(), 48);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 40);
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 48_000);
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 2);
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 4);
        assert_eq!(&wav[44..], &[1, 0, 2, 0]);
    }

    #[test]
    fn data_uri_is_playable_wav() {
        let speech = wav_data_uri(&PcmAudio::mono_16bit(24_000, vec![0; 8])).unwrap();
        let parsed = DataUri::parse(&speech.audio_data_uri).unwrap();
        assert_eq!(parsed.mime(), "audio/wav");
        assert_eq!(parsed.byte_len(), 52);

        let json = serde_json::to_value(&speech).unwrap();
        assert!(json["audioDataUri"].as_str().unwrap().starts_with("data:audio/wav;base64,UklGR"));
    }

    #[test]
    fn advice_narration_reads_every_section() {
        let advice = HealthAdvice {
            preliminary_advice: "Rest well.".into(),
            possible_conditions: vec!["Flu".into(), "Cold".into()],
            suggested_actions: vec!["Rest".into(), "Drink fluids".into()],
            urgency: "Low - Monitor symptoms".into(),
        };
        assert_eq!(
            advice_narration(&advice),
            "Preliminary advice: Rest well. Possible conditions: Flu, Cold. \
             Suggested actions: Rest, Drink fluids. Urgency: Low - Monitor symptoms."
        );
    }

    #[test]
    fn voice_narration_lists_causes() {
        let analysis = VoiceAnalysis {
            transcribed_symptoms: "cough".into(),
            possible_causes: vec![
                PossibleCause {
                    name: "Cold".into(),
                    description: "A viral infection.".into(),
                },
                PossibleCause {
                    name: "Allergy".into(),
                    description: "Reaction to dust".into(),
                },
            ],
            suggested_next_steps: vec!["Rest".into()],
            urgency: "Low".into(),
        };
        let text = voice_narration(&analysis);
        assert!(text.contains("possible causes: Cold: A viral infection. Allergy: Reaction to dust."));
        assert!(text.ends_with("the urgency level is: Low."));
    }
}
