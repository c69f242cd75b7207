//! Pipeline configuration loaded from an optional TOML file.
//!
//! Config keys (TOML, under `[audio]`): `enabled`, `sample_rate`,
//! `vad_threshold`, `min_speech_duration_ms`, `min_silence_duration_ms`,
//! `emotion_min_confidence`, `min_gap_sec`. Every key has a default so an
//! empty or missing file yields a working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level config file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Audio analysis pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Master switch for the audio pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Processing sample rate; 16 kHz is what the speech models expect.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Voice probability threshold for the VAD.
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
    /// Minimum speech segment duration in milliseconds.
    #[serde(default = "default_min_speech_duration_ms")]
    pub min_speech_duration_ms: u32,
    /// Minimum silence gap duration in milliseconds.
    #[serde(default = "default_min_silence_duration_ms")]
    pub min_silence_duration_ms: u32,
    /// Emotion scores below this floor are reported as "neutral".
    #[serde(default = "default_emotion_min_confidence")]
    pub emotion_min_confidence: f32,
    /// Minimum non-speech gap, in seconds, considered for genre analysis.
    #[serde(default = "default_min_gap_sec")]
    pub min_gap_sec: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sample_rate: default_sample_rate(),
            vad_threshold: default_vad_threshold(),
            min_speech_duration_ms: default_min_speech_duration_ms(),
            min_silence_duration_ms: default_min_silence_duration_ms(),
            emotion_min_confidence: default_emotion_min_confidence(),
            min_gap_sec: default_min_gap_sec(),
        }
    }
}

impl Config {
    /// Load and normalize a config file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.audio = self.audio.normalized();
        self
    }
}

impl AudioConfig {
    /// Clamp out-of-range values instead of rejecting the file.
    pub fn normalized(mut self) -> Self {
        self.sample_rate = self.sample_rate.max(8_000);
        self.vad_threshold = self.vad_threshold.clamp(0.0, 1.0);
        self.min_speech_duration_ms = self.min_speech_duration_ms.max(50);
        self.min_silence_duration_ms = self.min_silence_duration_ms.max(10);
        self.emotion_min_confidence = self.emotion_min_confidence.clamp(0.0, 1.0);
        self.min_gap_sec = self.min_gap_sec.max(0.0);
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_vad_threshold() -> f32 {
    0.5
}

fn default_min_speech_duration_ms() -> u32 {
    250
}

fn default_min_silence_duration_ms() -> u32 {
    100
}

fn default_emotion_min_confidence() -> f32 {
    0.25
}

fn default_min_gap_sec() -> f32 {
    0.5
}
