//! Heuristic music-genre classification over non-speech audio.
//!
//! Uses the "gaps" method: classify only the stretches between detected
//! speech so the voice does not contaminate the music features. The rule
//! table encodes the product's tuned thresholds; order is part of the
//! contract (first match wins).

use crate::analysis::segments::{self, SpeechSegment};
use crate::analysis::{spectral, tempo};
use crate::audio::Waveform;
use crate::error::AnalysisError;

const MIN_ANALYSIS_SECONDS: f32 = 0.5;
const MEL_BANDS: usize = 128;
const MEL_FMAX_HZ: f32 = 8_000.0;

/// Scalar aggregates driving the genre rules.
#[derive(Debug, Clone, Copy)]
pub struct GenreFeatures {
    pub centroid_hz: f32,
    pub rolloff_hz: f32,
    pub rms: f32,
    pub zero_crossing_rate: f32,
    pub tempo_bpm: f32,
}

/// One row of the decision table.
struct GenreRule {
    genre: &'static str,
    subgenres: &'static [&'static str],
    confidence: f32,
    matches: fn(&GenreFeatures) -> bool,
}

/// Ordered decision table; the first matching rule wins.
const GENRE_RULES: &[GenreRule] = &[
    // Orchestral texture: low centroid, moderate rolloff, restrained level.
    GenreRule {
        genre: "dramatic",
        subgenres: &["cinematic", "orchestral"],
        confidence: 0.7,
        matches: |f| {
            f.centroid_hz < 2_000.0
                && f.rolloff_hz > 2_500.0
                && f.rolloff_hz < 4_500.0
                && f.rms < 0.06
        },
    },
    GenreRule {
        genre: "electronic",
        subgenres: &["edm", "dance"],
        confidence: 0.65,
        matches: |f| f.tempo_bpm > 120.0 && f.rms > 0.08 && f.zero_crossing_rate > 0.1,
    },
    GenreRule {
        genre: "classical",
        subgenres: &["orchestral"],
        confidence: 0.6,
        matches: |f| f.tempo_bpm < 90.0 && f.centroid_hz < 2_000.0 && f.rolloff_hz > 3_500.0,
    },
    GenreRule {
        genre: "rock",
        subgenres: &["alternative"],
        confidence: 0.6,
        matches: |f| f.rms > 0.12 && f.centroid_hz > 2_000.0 && f.centroid_hz < 3_500.0,
    },
    GenreRule {
        genre: "pop",
        subgenres: &["mainstream"],
        confidence: 0.55,
        matches: |f| f.tempo_bpm > 100.0 && f.centroid_hz > 3_000.0,
    },
    GenreRule {
        genre: "ambient",
        subgenres: &["background"],
        confidence: 0.5,
        matches: |f| f.rms < 0.04 && f.tempo_bpm < 100.0,
    },
];

/// Classify a feature vector against the rule table.
pub fn classify_genre_features(features: &GenreFeatures) -> (String, f32, Vec<String>) {
    for rule in GENRE_RULES {
        if (rule.matches)(features) {
            return (
                rule.genre.to_string(),
                rule.confidence,
                rule.subgenres.iter().map(|s| s.to_string()).collect(),
            );
        }
    }
    ("unknown".to_string(), 0.3, Vec::new())
}

/// Analyze the music genre of a clip's audio.
///
/// With speech segments supplied, the longest non-speech gap is analyzed,
/// falling back to the full waveform when no gap clears the minimum
/// duration. Audio under half a second returns the "no signal" result.
pub fn analyze_genre(
    waveform: &Waveform,
    speech_segments: &[SpeechSegment],
    min_gap_sec: f32,
) -> Result<(String, f32, Vec<String>), AnalysisError> {
    let analysis_audio: Vec<f32> = if !speech_segments.is_empty() {
        let chunks = segments::extract_music_gaps(waveform, speech_segments, min_gap_sec);
        match chunks.into_iter().max_by_key(|chunk| chunk.len()) {
            Some(longest) => {
                tracing::debug!(
                    "Analyzing music from gaps (using {:.1}s chunk)",
                    longest.len() as f32 / waveform.sample_rate.max(1) as f32
                );
                longest
            }
            None => {
                tracing::debug!("No music gaps found, analyzing full audio");
                waveform.samples.clone()
            }
        }
    } else {
        waveform.samples.clone()
    };

    if (analysis_audio.len() as f32) < waveform.sample_rate as f32 * MIN_ANALYSIS_SECONDS {
        tracing::debug!("Music segment too short for genre analysis");
        return Ok(("unknown".to_string(), 0.0, Vec::new()));
    }

    let mel_db =
        spectral::mel_spectrogram_db(&analysis_audio, waveform.sample_rate, MEL_BANDS, MEL_FMAX_HZ);
    let mel_mean_db = mel_db.iter().flatten().copied().sum::<f32>()
        / mel_db.iter().map(|frame| frame.len()).sum::<usize>().max(1) as f32;

    let aggregates = spectral::extract_spectral_aggregates(&analysis_audio, waveform.sample_rate);
    let features = GenreFeatures {
        centroid_hz: aggregates.centroid_hz,
        rolloff_hz: aggregates.rolloff_hz,
        rms: aggregates.rms,
        zero_crossing_rate: aggregates.zero_crossing_rate,
        tempo_bpm: tempo::estimate_tempo_bpm(&analysis_audio, waveform.sample_rate),
    };

    let (genre, confidence, subgenres) = classify_genre_features(&features);
    tracing::debug!(
        "Genre: {genre} ({confidence:.2}), tempo={:.0}, centroid={:.0}, rolloff={:.0}, \
         rms={:.4}, mel_mean={mel_mean_db:.1}dB",
        features.tempo_bpm,
        features.centroid_hz,
        features.rolloff_hz,
        features.rms,
    );
    Ok((genre, confidence, subgenres))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(
        centroid_hz: f32,
        rolloff_hz: f32,
        rms: f32,
        zero_crossing_rate: f32,
        tempo_bpm: f32,
    ) -> GenreFeatures {
        GenreFeatures {
            centroid_hz,
            rolloff_hz,
            rms,
            zero_crossing_rate,
            tempo_bpm,
        }
    }

    #[test]
    fn orchestral_texture_is_dramatic() {
        let (genre, confidence, subgenres) =
            classify_genre_features(&features(1_500.0, 3_000.0, 0.05, 0.05, 100.0));
        assert_eq!(genre, "dramatic");
        assert_eq!(confidence, 0.7);
        assert_eq!(subgenres, vec!["cinematic", "orchestral"]);
    }

    #[test]
    fn fast_loud_noisy_audio_is_electronic() {
        let (genre, confidence, _) =
            classify_genre_features(&features(2_500.0, 5_000.0, 0.1, 0.15, 128.0));
        assert_eq!(genre, "electronic");
        assert_eq!(confidence, 0.65);
    }

    #[test]
    fn slow_dark_rich_audio_is_classical() {
        let (genre, _, subgenres) =
            classify_genre_features(&features(1_500.0, 4_800.0, 0.07, 0.05, 80.0));
        assert_eq!(genre, "classical");
        assert_eq!(subgenres, vec!["orchestral"]);
    }

    #[test]
    fn loud_mid_centroid_audio_is_rock() {
        let (genre, _, _) = classify_genre_features(&features(2_500.0, 5_000.0, 0.15, 0.05, 95.0));
        assert_eq!(genre, "rock");
    }

    #[test]
    fn bright_fast_audio_is_pop() {
        let (genre, confidence, _) =
            classify_genre_features(&features(3_500.0, 6_000.0, 0.06, 0.05, 110.0));
        assert_eq!(genre, "pop");
        assert_eq!(confidence, 0.55);
    }

    #[test]
    fn quiet_slow_audio_is_ambient() {
        let (genre, _, subgenres) =
            classify_genre_features(&features(2_500.0, 5_000.0, 0.03, 0.05, 80.0));
        assert_eq!(genre, "ambient");
        assert_eq!(subgenres, vec!["background"]);
    }

    #[test]
    fn unmatched_features_fall_back_to_unknown() {
        let (genre, confidence, subgenres) =
            classify_genre_features(&features(2_500.0, 5_000.0, 0.07, 0.05, 95.0));
        assert_eq!(genre, "unknown");
        assert_eq!(confidence, 0.3);
        assert!(subgenres.is_empty());
    }

    #[test]
    fn dramatic_outranks_ambient_when_both_match() {
        // Satisfies rule 1 (dramatic) and rule 6 (ambient); rule 1 wins.
        let (genre, _, _) = classify_genre_features(&features(1_500.0, 3_000.0, 0.03, 0.05, 80.0));
        assert_eq!(genre, "dramatic");
    }

    #[test]
    fn short_audio_skips_analysis() {
        let waveform = Waveform {
            samples: vec![0.1_f32; 4_000],
            sample_rate: 16_000,
        };
        let (genre, confidence, subgenres) = analyze_genre(&waveform, &[], 0.5).unwrap();
        assert_eq!(genre, "unknown");
        assert_eq!(confidence, 0.0);
        assert!(subgenres.is_empty());
    }

    #[test]
    fn silent_clip_classifies_from_full_waveform() {
        let waveform = Waveform {
            samples: vec![0.0_f32; 32_000],
            sample_rate: 16_000,
        };
        let (genre, confidence, _) = analyze_genre(&waveform, &[], 0.5).unwrap();
        // Silence: rms 0, tempo 0 → ambient by the rule table.
        assert_eq!(genre, "ambient");
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn speech_covering_everything_falls_back_to_full_audio() {
        let waveform = Waveform {
            samples: vec![0.0_f32; 32_000],
            sample_rate: 16_000,
        };
        let segments = [SpeechSegment::new(0.0, 2.0)];
        let (genre, _, _) = analyze_genre(&waveform, &segments, 0.5).unwrap();
        assert_eq!(genre, "ambient");
    }
}
