//! Fundamental-frequency tracking via per-frame autocorrelation.
//!
//! Frames that fail the energy gate or the voicing threshold are treated as
//! unvoiced and excluded from the statistics, matching how pitch trackers
//! report 0 Hz for unvoiced stretches.

use crate::audio::sanitize_sample;

const FRAME_SIZE: usize = 1024;
const HOP_SIZE: usize = 256;
/// Praat-style default search band for speech F0.
const PITCH_FLOOR_HZ: f32 = 75.0;
const PITCH_CEILING_HZ: f32 = 600.0;
/// Minimum normalized autocorrelation for a frame to count as voiced.
const VOICING_THRESHOLD: f32 = 0.45;
/// Frames quieter than this RMS are unvoiced regardless of periodicity.
const ENERGY_GATE: f32 = 1e-3;

/// Mean and spread of the voiced F0 track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PitchStats {
    pub(crate) mean_hz: f32,
    pub(crate) std_hz: f32,
    pub(crate) voiced_frames: usize,
}

/// Track F0 across the waveform and aggregate the voiced frames.
/// Zero voiced frames yields 0.0 for both mean and standard deviation.
pub(crate) fn track_pitch(samples: &[f32], sample_rate: u32) -> PitchStats {
    let mut voiced = Vec::new();
    let mut start = 0usize;
    while start + FRAME_SIZE <= samples.len() {
        if let Some(f0) = frame_f0(&samples[start..start + FRAME_SIZE], sample_rate) {
            voiced.push(f0);
        }
        start += HOP_SIZE;
    }

    if voiced.is_empty() {
        return PitchStats {
            mean_hz: 0.0,
            std_hz: 0.0,
            voiced_frames: 0,
        };
    }

    let mean = voiced.iter().map(|&v| v as f64).sum::<f64>() / voiced.len() as f64;
    let variance = voiced
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / voiced.len() as f64;
    PitchStats {
        mean_hz: mean as f32,
        std_hz: variance.sqrt() as f32,
        voiced_frames: voiced.len(),
    }
}

/// F0 of one frame, or `None` when the frame is unvoiced.
fn frame_f0(frame: &[f32], sample_rate: u32) -> Option<f32> {
    let sr = sample_rate.max(1) as f32;
    let mut centered: Vec<f32> = frame.iter().copied().map(sanitize_sample).collect();
    let mean = centered.iter().copied().sum::<f32>() / centered.len().max(1) as f32;
    for v in &mut centered {
        *v -= mean;
    }

    let energy: f64 = centered.iter().map(|&v| (v as f64) * (v as f64)).sum();
    let rms = (energy / centered.len().max(1) as f64).sqrt() as f32;
    if rms < ENERGY_GATE {
        return None;
    }

    let min_lag = ((sr / PITCH_CEILING_HZ).floor() as usize).max(1);
    let max_lag = ((sr / PITCH_FLOOR_HZ).ceil() as usize).min(centered.len() / 2);
    if max_lag <= min_lag {
        return None;
    }

    let mut best_lag = 0usize;
    let mut best_value = 0.0_f64;
    for lag in min_lag..=max_lag {
        let mut sum = 0.0_f64;
        for i in 0..(centered.len() - lag) {
            sum += centered[i] as f64 * centered[i + lag] as f64;
        }
        let value = sum / energy;
        if value > best_value {
            best_value = value;
            best_lag = lag;
        }
    }

    if best_lag == 0 || (best_value as f32) < VOICING_THRESHOLD {
        return None;
    }
    Some(sr / best_lag as f32)
}
