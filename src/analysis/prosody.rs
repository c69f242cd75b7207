//! Prosody-based voiceover style classifier.
//!
//! Pure signal processing, no trained models: tempo, pitch and energy are
//! mapped to a marketing-relevant style tag through an ordered rule table.
//! The thresholds are empirical product constants; rule order is part of the
//! contract and changing it changes outcomes on boundary cases.

use std::path::Path;

use serde_json::json;

use crate::analysis::{pitch, round_to, spectral, tempo};
use crate::audio;
use crate::error::AnalysisError;

/// Prosody descriptors plus the derived style label.
#[derive(Debug, Clone, PartialEq)]
pub struct ProsodyFeatures {
    pub tempo_bpm: f32,
    pub mean_pitch_hz: f32,
    pub pitch_variation_hz: f32,
    pub energy_level: f32,
    pub voiceover_style: String,
}

impl ProsodyFeatures {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "tempo_bpm": round_to(self.tempo_bpm, 1),
            "mean_pitch_hz": round_to(self.mean_pitch_hz, 1),
            "pitch_variation_hz": round_to(self.pitch_variation_hz, 1),
            "energy_level": round_to(self.energy_level, 4),
            "voiceover_style": self.voiceover_style,
        })
    }
}

/// Feature vector the style rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct StyleInputs {
    pub tempo: f32,
    pub pitch: f32,
    pub pitch_std: f32,
    pub energy: f32,
}

type StyleRule = (
    fn(&StyleInputs) -> bool,
    fn(&StyleInputs) -> &'static str,
);

/// Ordered decision table; the first matching rule wins.
const STYLE_RULES: &[StyleRule] = &[
    // High energy + high tempo: promo read.
    (
        |f| f.energy > 0.05 && f.tempo > 140.0,
        |f| if f.pitch > 180.0 { "hype" } else { "aggressive" },
    ),
    // Wide pitch range: emotional delivery.
    (|f| f.pitch_std > 30.0, |_| "storytelling"),
    // Fast but controlled energy: explainer.
    (|f| f.tempo > 120.0 && f.energy < 0.08, |_| "tutorial"),
    // Low pitch + slow pace: corporate read.
    (|f| f.pitch < 150.0 && f.tempo < 100.0, |_| "authoritative"),
    // Quiet and slow: close-mic delivery.
    (|f| f.energy < 0.03 && f.tempo < 90.0, |_| "intimate"),
];

/// Map prosody features to a marketing style tag.
pub fn classify_style(inputs: &StyleInputs) -> &'static str {
    for (matches, label) in STYLE_RULES {
        if matches(inputs) {
            return label(inputs);
        }
    }
    "neutral"
}

/// Analyze voiceover prosody of an audio file.
pub fn analyze_prosody(
    audio_path: &Path,
    sample_rate: u32,
) -> Result<ProsodyFeatures, AnalysisError> {
    let waveform = audio::load_waveform(audio_path, sample_rate)?;

    let tempo_bpm = tempo::estimate_tempo_bpm(&waveform.samples, waveform.sample_rate);
    let pitch_stats = pitch::track_pitch(&waveform.samples, waveform.sample_rate);
    let energy_level = spectral::mean_frame_rms(&waveform.samples);

    let style = classify_style(&StyleInputs {
        tempo: tempo_bpm,
        pitch: pitch_stats.mean_hz,
        pitch_std: pitch_stats.std_hz,
        energy: energy_level,
    });
    tracing::debug!(
        "Prosody: tempo={tempo_bpm:.1}bpm, pitch={:.1}Hz, pitch_std={:.1}Hz, \
         energy={energy_level:.4}, style={style}",
        pitch_stats.mean_hz,
        pitch_stats.std_hz,
    );

    Ok(ProsodyFeatures {
        tempo_bpm,
        mean_pitch_hz: pitch_stats.mean_hz,
        pitch_variation_hz: pitch_stats.std_hz,
        energy_level,
        voiceover_style: style.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(tempo: f32, pitch: f32, pitch_std: f32, energy: f32) -> StyleInputs {
        StyleInputs {
            tempo,
            pitch,
            pitch_std,
            energy,
        }
    }

    #[test]
    fn fast_loud_high_pitch_is_hype() {
        assert_eq!(classify_style(&inputs(150.0, 200.0, 10.0, 0.08)), "hype");
    }

    #[test]
    fn fast_loud_low_pitch_is_aggressive() {
        assert_eq!(
            classify_style(&inputs(150.0, 100.0, 10.0, 0.08)),
            "aggressive"
        );
    }

    #[test]
    fn wide_pitch_variation_is_storytelling() {
        assert_eq!(
            classify_style(&inputs(110.0, 160.0, 40.0, 0.04)),
            "storytelling"
        );
    }

    #[test]
    fn fast_and_moderate_energy_is_tutorial() {
        assert_eq!(classify_style(&inputs(130.0, 160.0, 10.0, 0.04)), "tutorial");
    }

    #[test]
    fn low_slow_voice_is_authoritative() {
        assert_eq!(
            classify_style(&inputs(90.0, 120.0, 10.0, 0.04)),
            "authoritative"
        );
    }

    #[test]
    fn quiet_slow_high_voice_is_intimate() {
        assert_eq!(classify_style(&inputs(80.0, 200.0, 10.0, 0.02)), "intimate");
    }

    #[test]
    fn middle_of_the_road_is_neutral() {
        assert_eq!(classify_style(&inputs(110.0, 170.0, 10.0, 0.04)), "neutral");
    }

    #[test]
    fn hype_rule_outranks_storytelling() {
        // Satisfies both rule 1 and rule 2; first match must win.
        assert_eq!(classify_style(&inputs(150.0, 200.0, 40.0, 0.08)), "hype");
    }

    #[test]
    fn to_json_applies_rounding_rules() {
        let features = ProsodyFeatures {
            tempo_bpm: 123.456,
            mean_pitch_hz: 180.04,
            pitch_variation_hz: 12.34,
            energy_level: 0.056_789,
            voiceover_style: "hype".to_string(),
        };
        let value = features.to_json();
        assert_eq!(value["tempo_bpm"], 123.5);
        assert_eq!(value["mean_pitch_hz"], 180.0);
        assert_eq!(value["pitch_variation_hz"], 12.3);
        assert_eq!(value["energy_level"], 0.0568);
        assert_eq!(value["voiceover_style"], "hype");
    }
}
