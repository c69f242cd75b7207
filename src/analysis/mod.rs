//! Composite audio tagging pipeline.
//!
//! One run sequences voice activity detection, genre analysis over the
//! non-speech gaps, and (when speech was found) prosody analysis. Each
//! stage failure is isolated: it lands in the result's `errors` list and
//! the run carries on, so a partial tag set is returned instead of nothing.

pub mod emotion;
pub mod genre;
pub(crate) mod pitch;
pub mod prosody;
pub mod segments;
pub(crate) mod spectral;
pub(crate) mod tempo;
pub mod vad;

use std::path::Path;
use std::time::Instant;

use serde_json::json;

use crate::audio;
use crate::config::AudioConfig;
use crate::error::ExtractionError;
use crate::models::ModelRegistry;

pub use prosody::ProsodyFeatures;
pub use segments::{SpeechSegment, extract_music_gaps, extract_speech_audio};

/// Stage identifiers recorded in `models_invoked` for provenance.
pub const MODEL_VAD: &str = "silero_vad";
pub const MODEL_GENRE: &str = "genre_heuristic";
pub const MODEL_PROSODY: &str = "prosody";

/// Complete audio analysis output for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAnalysisResult {
    pub voice_detected: bool,
    pub voice_segments: Vec<SpeechSegment>,
    pub voice_mood: String,
    pub voice_mood_confidence: f32,
    pub prosody: Option<ProsodyFeatures>,
    pub music_genre: String,
    pub music_genre_confidence: f32,
    pub music_subgenres: Vec<String>,
    pub processing_time_ms: f32,
    pub models_invoked: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for AudioAnalysisResult {
    fn default() -> Self {
        Self {
            voice_detected: false,
            voice_segments: Vec::new(),
            voice_mood: "none".to_string(),
            voice_mood_confidence: 1.0,
            prosody: None,
            music_genre: "unknown".to_string(),
            music_genre_confidence: 0.0,
            music_subgenres: Vec::new(),
            processing_time_ms: 0.0,
            models_invoked: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl AudioAnalysisResult {
    /// Serialize for merging into the per-clip tag dictionary. Applies the
    /// output rounding rules; the `prosody` key is present only when the
    /// stage produced features.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "voice_detected": self.voice_detected,
            "voice_mood": self.voice_mood,
            "voice_mood_confidence": round_to(self.voice_mood_confidence, 3),
            "voice_segments_seconds": self
                .voice_segments
                .iter()
                .map(|s| json!([round_to(s.start_sec, 2), round_to(s.end_sec, 2)]))
                .collect::<Vec<_>>(),
            "music_genre": self.music_genre,
            "music_genre_confidence": round_to(self.music_genre_confidence, 3),
            "music_subgenres": self.music_subgenres,
            "processing_time_ms": round_to(self.processing_time_ms, 1),
            "models_invoked": self.models_invoked,
        });
        if let Some(prosody) = &self.prosody {
            value["prosody"] = prosody.to_json();
        }
        value
    }
}

/// Round for JSON output; returns f64 so serde_json stores a plain number.
pub(crate) fn round_to(value: f32, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value as f64 * factor).round() / factor
}

/// Run the complete audio analysis pipeline on an audio file.
///
/// Never panics or returns an error for data-quality problems: a clip that
/// cannot even be decoded yields a default result with the failure recorded
/// in `errors`, so one bad clip cannot abort a batch.
pub fn analyze_audio(
    audio_path: &Path,
    config: &AudioConfig,
    models: &ModelRegistry,
) -> AudioAnalysisResult {
    let start_time = Instant::now();
    let mut result = AudioAnalysisResult {
        models_invoked: vec![MODEL_VAD.to_string()],
        ..AudioAnalysisResult::default()
    };

    tracing::info!("Analyzing audio: {}", audio_path.display());
    run_stages(audio_path, config, models, &mut result);

    result.processing_time_ms = start_time.elapsed().as_secs_f32() * 1_000.0;
    tracing::info!(
        "Audio analysis complete: voice={}, mood={}, genre={}, time={:.0}ms",
        result.voice_detected,
        result.voice_mood,
        result.music_genre,
        result.processing_time_ms
    );
    result
}

fn run_stages(
    audio_path: &Path,
    config: &AudioConfig,
    models: &ModelRegistry,
    result: &mut AudioAnalysisResult,
) {
    // Load. A clip we cannot decode produces no tags at all.
    let waveform = match audio::load_waveform(audio_path, config.sample_rate) {
        Ok(waveform) => waveform,
        Err(err) => {
            tracing::error!("Audio analysis failed: {err}");
            result.errors.push(err.to_string());
            return;
        }
    };
    tracing::debug!(
        "Loaded audio: {:.1}s at {}Hz",
        waveform.duration_seconds(),
        waveform.sample_rate
    );

    // VAD gates everything downstream; its failure is fatal to the run.
    let segments = match models
        .vad()
        .and_then(|vad| vad.detect_speech(&waveform, &config.into()))
    {
        Ok((has_speech, segments)) => {
            result.voice_detected = has_speech;
            result.voice_segments = segments.clone();
            segments
        }
        Err(err) => {
            tracing::error!("Audio analysis failed: {err}");
            result.errors.push(err.to_string());
            return;
        }
    };

    // Genre is attempted regardless of the voice outcome.
    result.models_invoked.push(MODEL_GENRE.to_string());
    match genre::analyze_genre(&waveform, &segments, config.min_gap_sec) {
        Ok((genre, confidence, subgenres)) => {
            result.music_genre = genre;
            result.music_genre_confidence = confidence;
            result.music_subgenres = subgenres;
        }
        Err(err) => {
            tracing::error!("Genre analysis failed: {err}");
            result.errors.push(format!("genre: {err}"));
        }
    }

    if result.voice_detected {
        tracing::debug!("Speech detected, running prosody analysis");
        result.models_invoked.push(MODEL_PROSODY.to_string());
        match prosody::analyze_prosody(audio_path, config.sample_rate) {
            Ok(features) => {
                // The prosody style doubles as the voice mood tag.
                result.voice_mood = features.voiceover_style.clone();
                result.voice_mood_confidence = 1.0;
                result.prosody = Some(features);
            }
            Err(err) => {
                tracing::error!("Prosody analysis failed: {err}");
                result.errors.push(format!("prosody: {err}"));
            }
        }
    } else {
        tracing::debug!("No speech detected, skipping prosody analysis");
        result.voice_mood = "none".to_string();
        result.voice_mood_confidence = 1.0;
    }
}

/// Extract the audio track from a video and run the analysis pipeline.
///
/// The extracted WAV lives only for this call; it is removed on every exit
/// path. Extraction problems (missing input, missing tool) propagate since
/// they indicate caller misuse or a broken installation, not clip quality.
pub fn analyze_video_audio(
    video_path: &Path,
    config: &AudioConfig,
    models: &ModelRegistry,
) -> Result<AudioAnalysisResult, ExtractionError> {
    let temp_audio = audio::extract::extract_audio(video_path, config.sample_rate)?;
    Ok(analyze_audio(temp_audio.path(), config, models))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_result() -> AudioAnalysisResult {
        AudioAnalysisResult {
            voice_detected: true,
            voice_segments: vec![SpeechSegment::new(0.504, 2.296)],
            voice_mood: "hype".to_string(),
            voice_mood_confidence: 1.0,
            prosody: Some(ProsodyFeatures {
                tempo_bpm: 150.26,
                mean_pitch_hz: 201.5,
                pitch_variation_hz: 11.111,
                energy_level: 0.081_234,
                voiceover_style: "hype".to_string(),
            }),
            music_genre: "pop".to_string(),
            music_genre_confidence: 0.55,
            music_subgenres: vec!["mainstream".to_string()],
            processing_time_ms: 245.67,
            models_invoked: vec![
                MODEL_VAD.to_string(),
                MODEL_GENRE.to_string(),
                MODEL_PROSODY.to_string(),
            ],
            errors: Vec::new(),
        }
    }

    #[test]
    fn default_result_has_no_voice_and_unknown_genre() {
        let result = AudioAnalysisResult::default();
        assert!(!result.voice_detected);
        assert_eq!(result.voice_mood, "none");
        assert_eq!(result.voice_mood_confidence, 1.0);
        assert!(result.prosody.is_none());
        assert_eq!(result.music_genre, "unknown");
        assert_eq!(result.music_genre_confidence, 0.0);
    }

    #[test]
    fn to_json_rounds_and_shapes_fields() {
        let value = populated_result().to_json();
        assert_eq!(value["voice_detected"], true);
        assert_eq!(value["voice_mood"], "hype");
        assert_eq!(value["voice_mood_confidence"], 1.0);
        assert_eq!(value["voice_segments_seconds"], json!([[0.5, 2.3]]));
        assert_eq!(value["music_genre"], "pop");
        assert_eq!(value["music_genre_confidence"], 0.55);
        assert_eq!(value["music_subgenres"], json!(["mainstream"]));
        assert_eq!(value["processing_time_ms"], 245.7);
        assert_eq!(value["prosody"]["tempo_bpm"], 150.3);
        assert_eq!(value["prosody"]["energy_level"], 0.0812);
        assert_eq!(value["prosody"]["voiceover_style"], "hype");
    }

    #[test]
    fn to_json_omits_prosody_when_absent() {
        let result = AudioAnalysisResult::default();
        let value = result.to_json();
        assert!(value.get("prosody").is_none());
        assert_eq!(value["voice_segments_seconds"], json!([]));
    }

    #[test]
    fn round_to_handles_each_output_precision() {
        assert_eq!(round_to(123.456, 1), 123.5);
        assert_eq!(round_to(0.056_789, 4), 0.0568);
        assert_eq!(round_to(0.8499, 3), 0.85);
        assert_eq!(round_to(1.005, 2), 1.0); // f32 1.005 sits just below the tie
    }

    #[test]
    fn invariants_hold_on_default_and_populated_results() {
        let empty = AudioAnalysisResult::default();
        assert_eq!(empty.voice_detected, !empty.voice_segments.is_empty());

        let populated = populated_result();
        assert_eq!(populated.voice_detected, !populated.voice_segments.is_empty());
        assert!(populated.prosody.is_none() || populated.voice_detected);
    }
}
