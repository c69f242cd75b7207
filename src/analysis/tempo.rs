//! Tempo estimation from an onset-strength envelope.
//!
//! The envelope is the half-wave-rectified spectral flux of the mel
//! spectrogram, and the tempo is read off the strongest autocorrelation
//! peak inside the plausible BPM band. No beat grid is produced; the
//! pipeline only needs the scalar estimate.

use super::spectral;

const ONSET_MEL_BANDS: usize = 128;
const ONSET_MEL_FMAX_HZ: f32 = 8_000.0;
const MIN_TEMPO_BPM: f32 = 30.0;
const MAX_TEMPO_BPM: f32 = 300.0;

/// Estimate a single tempo in BPM; 0.0 when the clip is too short or flat
/// for a meaningful estimate.
pub(crate) fn estimate_tempo_bpm(samples: &[f32], sample_rate: u32) -> f32 {
    let envelope = onset_strength(samples, sample_rate);
    let frames_per_second = sample_rate.max(1) as f32 / spectral::HOP_SIZE as f32;
    tempo_from_envelope(&envelope, frames_per_second)
}

/// Half-wave-rectified mel flux, one value per STFT frame.
pub(crate) fn onset_strength(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let mel = spectral::mel_spectrogram_db(samples, sample_rate, ONSET_MEL_BANDS, ONSET_MEL_FMAX_HZ);
    if mel.len() < 2 {
        return Vec::new();
    }
    let mut envelope = Vec::with_capacity(mel.len() - 1);
    for pair in mel.windows(2) {
        let mut sum = 0.0_f64;
        for (prev, current) in pair[0].iter().zip(pair[1].iter()) {
            sum += (current - prev).max(0.0) as f64;
        }
        envelope.push((sum / pair[0].len().max(1) as f64) as f32);
    }
    envelope
}

fn tempo_from_envelope(envelope: &[f32], frames_per_second: f32) -> f32 {
    if envelope.is_empty() || frames_per_second <= 0.0 {
        return 0.0;
    }
    let mean = envelope.iter().copied().sum::<f32>() / envelope.len() as f32;
    let centered: Vec<f32> = envelope.iter().map(|v| v - mean).collect();
    let energy: f64 = centered.iter().map(|&v| (v as f64) * (v as f64)).sum();
    if energy <= 0.0 {
        return 0.0;
    }

    let min_lag = ((60.0 * frames_per_second / MAX_TEMPO_BPM).floor() as usize).max(1);
    let max_lag = ((60.0 * frames_per_second / MIN_TEMPO_BPM).ceil() as usize)
        .min(centered.len().saturating_sub(1));
    if max_lag < min_lag {
        return 0.0;
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

    if best_lag == 0 {
        return 0.0;
    }
    60.0 * frames_per_second / best_lag as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DEFAULT_SAMPLE_RATE;

    /// Click track: short bursts at a fixed beat interval over silence.
    fn click_track(bpm: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
        let len = (seconds * sample_rate as f32) as usize;
        let beat_samples = (60.0 / bpm * sample_rate as f32) as usize;
        let click_len = sample_rate as usize / 100;
        let mut samples = vec![0.0_f32; len];
        let mut start = 0usize;
        while start < len {
            for i in start..(start + click_len).min(len) {
                samples[i] = ((i - start) as f32 * 0.9).sin() * 0.8;
            }
            start += beat_samples;
        }
        samples
    }

    #[test]
    fn click_track_tempo_is_recovered_within_tolerance() {
        let samples = click_track(120.0, 8.0, DEFAULT_SAMPLE_RATE);
        let tempo = estimate_tempo_bpm(&samples, DEFAULT_SAMPLE_RATE);
        // Autocorrelation may lock onto a harmonic; accept the half/double band.
        let ratio = tempo / 120.0;
        assert!(
            (0.9..1.1).contains(&ratio) || (1.8..2.2).contains(&ratio) || (0.45..0.55).contains(&ratio),
            "tempo {tempo} not near 120 or an octave of it"
        );
    }

    #[test]
    fn silence_has_zero_tempo() {
        let samples = vec![0.0_f32; DEFAULT_SAMPLE_RATE as usize * 2];
        assert_eq!(estimate_tempo_bpm(&samples, DEFAULT_SAMPLE_RATE), 0.0);
    }

    #[test]
    fn too_short_input_has_zero_tempo() {
        let samples = vec![0.1_f32; 256];
        assert_eq!(estimate_tempo_bpm(&samples, DEFAULT_SAMPLE_RATE), 0.0);
    }
}
