//! Frequency-domain feature extraction (STFT + spectral statistics + mel).

use rustfft::{FftPlanner, num_complex::Complex};

use crate::audio::sanitize_sample;

pub(crate) const FRAME_SIZE: usize = 2048;
pub(crate) const HOP_SIZE: usize = 512;
const ROLLOFF_FRACTION: f32 = 0.85;

/// Per-clip means of the frame-wise spectral descriptors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralAggregates {
    pub centroid_hz: f32,
    pub rolloff_hz: f32,
    pub rms: f32,
    pub zero_crossing_rate: f32,
}

/// Extract mean spectral centroid, rolloff, frame RMS and zero-crossing rate.
pub(crate) fn extract_spectral_aggregates(samples: &[f32], sample_rate: u32) -> SpectralAggregates {
    let frames = magnitude_frames(samples, FRAME_SIZE, HOP_SIZE);
    let mut centroid_sum = 0.0_f64;
    let mut rolloff_sum = 0.0_f64;
    for frame in &frames {
        let (magnitude_total, centroid) = centroid_hz(frame, sample_rate, FRAME_SIZE);
        centroid_sum += centroid as f64;
        rolloff_sum += rolloff_hz(frame, sample_rate, FRAME_SIZE, magnitude_total) as f64;
    }
    let frame_count = frames.len().max(1) as f64;

    SpectralAggregates {
        centroid_hz: (centroid_sum / frame_count) as f32,
        rolloff_hz: (rolloff_sum / frame_count) as f32,
        rms: mean_frame_rms(samples),
        zero_crossing_rate: mean_frame_zcr(samples),
    }
}

/// Mean of frame-wise RMS over `FRAME_SIZE` windows with `HOP_SIZE` hop.
pub(crate) fn mean_frame_rms(samples: &[f32]) -> f32 {
    let mut sum = 0.0_f64;
    let mut count = 0usize;
    for frame in time_frames(samples, FRAME_SIZE, HOP_SIZE) {
        sum += frame_rms(frame) as f64;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64) as f32
}

/// Mean fraction of sign changes per frame.
fn mean_frame_zcr(samples: &[f32]) -> f32 {
    let mut sum = 0.0_f64;
    let mut count = 0usize;
    for frame in time_frames(samples, FRAME_SIZE, HOP_SIZE) {
        let mut crossings = 0usize;
        for pair in frame.windows(2) {
            let a = sanitize_sample(pair[0]);
            let b = sanitize_sample(pair[1]);
            if (a >= 0.0 && b < 0.0) || (a < 0.0 && b >= 0.0) {
                crossings += 1;
            }
        }
        sum += crossings as f64 / frame.len().max(1) as f64;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64) as f32
}

fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0_f64;
    for &sample in frame {
        let sample = sanitize_sample(sample) as f64;
        sum += sample * sample;
    }
    ((sum / frame.len() as f64).max(0.0).sqrt() as f32).clamp(0.0, 1.0)
}

/// Iterate frames of up to `frame_size` samples; tail frames may be short
/// and are zero-padded by callers that need a fixed length.
fn time_frames<'a>(
    samples: &'a [f32],
    frame_size: usize,
    hop_size: usize,
) -> impl Iterator<Item = &'a [f32]> + 'a {
    let frame_size = frame_size.max(1);
    let hop_size = hop_size.max(1);
    let mut start = 0usize;
    std::iter::from_fn(move || {
        if start >= samples.len() {
            return None;
        }
        let end = (start + frame_size).min(samples.len());
        let frame = &samples[start..end];
        start += hop_size;
        Some(frame)
    })
}

/// Windowed magnitude spectra, one `frame_size / 2 + 1` bin vector per frame.
/// Always yields at least one (zero) frame so aggregates stay defined.
pub(crate) fn magnitude_frames(
    samples: &[f32],
    frame_size: usize,
    hop_size: usize,
) -> Vec<Vec<f32>> {
    let frame_size = frame_size.max(2);
    let bins = frame_size / 2 + 1;
    let window = hann_window(frame_size);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(frame_size);
    let mut buffer = vec![Complex::new(0.0_f32, 0.0_f32); frame_size];

    let mut frames = Vec::new();
    for frame in time_frames(samples, frame_size, hop_size) {
        for (i, cell) in buffer.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *cell = Complex::new(sanitize_sample(sample) * window[i], 0.0);
        }
        fft.process(&mut buffer);
        let mut magnitudes = Vec::with_capacity(bins);
        for cell in buffer.iter().take(bins) {
            magnitudes.push(cell.norm().max(0.0));
        }
        frames.push(magnitudes);
    }

    if frames.is_empty() {
        frames.push(vec![0.0_f32; bins]);
    }
    frames
}

fn centroid_hz(magnitudes: &[f32], sample_rate: u32, fft_len: usize) -> (f32, f32) {
    let sr = sample_rate.max(1) as f64;
    let mut sum = 0.0_f64;
    let mut sum_freq = 0.0_f64;
    for (bin, &m) in magnitudes.iter().enumerate() {
        let m = m.max(0.0) as f64;
        sum += m;
        sum_freq += m * (bin as f64 * sr / fft_len as f64);
    }
    if sum <= 0.0 {
        return (0.0, 0.0);
    }
    (sum as f32, (sum_freq / sum) as f32)
}

fn rolloff_hz(magnitudes: &[f32], sample_rate: u32, fft_len: usize, magnitude_total: f32) -> f32 {
    let total = magnitude_total.max(0.0) as f64;
    if total <= 0.0 {
        return 0.0;
    }
    let target = total * ROLLOFF_FRACTION as f64;
    let sr = sample_rate.max(1) as f64;
    let mut cum = 0.0_f64;
    for (bin, &m) in magnitudes.iter().enumerate() {
        cum += m.max(0.0) as f64;
        if cum >= target {
            return (bin as f64 * sr / fft_len as f64) as f32;
        }
    }
    sample_rate as f32 * 0.5
}

pub(crate) fn hann_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| 0.5_f32 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / denom).cos()))
        .collect()
}

/// Triangular mel filterbank over power spectra.
pub(crate) struct MelBank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub(crate) fn new(sample_rate: u32, fft_len: usize, mel_bands: usize, f_max: f32) -> Self {
        let bins = mel_bins(sample_rate, fft_len, mel_bands, f_max);
        let mut filters = Vec::with_capacity(mel_bands);
        for m in 0..mel_bands {
            let left = bins[m];
            let center = bins[m + 1];
            let right = bins[m + 2].max(center + 1);
            filters.push(build_tri_filter(left, center, right));
        }
        Self { filters }
    }

    pub(crate) fn apply(&self, power: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let mut sum = 0.0_f64;
            for &(bin, weight) in filter {
                let p = power.get(bin).copied().unwrap_or(0.0).max(0.0) as f64;
                sum += p * weight as f64;
            }
            out.push(sum as f32);
        }
        out
    }
}

/// Mel power spectrogram converted to dB relative to the clip maximum,
/// one mel vector per frame.
pub(crate) fn mel_spectrogram_db(
    samples: &[f32],
    sample_rate: u32,
    mel_bands: usize,
    f_max: f32,
) -> Vec<Vec<f32>> {
    let bank = MelBank::new(sample_rate, FRAME_SIZE, mel_bands, f_max);
    let mut mel_frames = Vec::new();
    let mut max_energy = 0.0_f32;
    for frame in magnitude_frames(samples, FRAME_SIZE, HOP_SIZE) {
        let power: Vec<f32> = frame.iter().map(|m| m * m).collect();
        let energies = bank.apply(&power);
        for &e in &energies {
            max_energy = max_energy.max(e);
        }
        mel_frames.push(energies);
    }
    let reference = max_energy.max(1e-10);
    for frame in &mut mel_frames {
        for e in frame.iter_mut() {
            *e = 10.0 * (e.max(1e-10) / reference).log10();
        }
    }
    mel_frames
}

fn mel_bins(sample_rate: u32, fft_len: usize, mel_bands: usize, f_max: f32) -> Vec<usize> {
    let nyquist = sample_rate.max(1) as f32 * 0.5;
    let f_max = f_max.min(nyquist).max(1.0);
    let mel_max = hz_to_mel(f_max);
    let mut bins = Vec::with_capacity(mel_bands + 2);
    for i in 0..(mel_bands + 2) {
        let t = i as f32 / (mel_bands + 1) as f32;
        bins.push(freq_to_bin(mel_to_hz(mel_max * t), sample_rate, fft_len));
    }
    bins
}

fn build_tri_filter(left: usize, center: usize, right: usize) -> Vec<(usize, f32)> {
    let mut weights = Vec::new();
    if right <= left {
        return weights;
    }
    for bin in left..=right {
        let w = if bin < center {
            if center == left {
                0.0
            } else {
                (bin as f32 - left as f32) / (center as f32 - left as f32)
            }
        } else if right == center {
            0.0
        } else {
            (right as f32 - bin as f32) / (right as f32 - center as f32)
        };
        if w > 0.0 {
            weights.push((bin, w));
        }
    }
    weights
}

fn freq_to_bin(freq_hz: f32, sample_rate: u32, fft_len: usize) -> usize {
    let nyquist = sample_rate.max(1) as f32 * 0.5;
    let freq = freq_hz.clamp(0.0, nyquist);
    (((freq * fft_len as f32) / sample_rate.max(1) as f32).floor() as usize).min(fft_len / 2)
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0_f32 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0_f32 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DEFAULT_SAMPLE_RATE;

    fn sine(freq: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
        let len = (seconds * sample_rate as f32) as usize;
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn sine_wave_centroid_tracks_frequency() {
        let samples = sine(440.0, 0.5, DEFAULT_SAMPLE_RATE);
        let feats = extract_spectral_aggregates(&samples, DEFAULT_SAMPLE_RATE);
        assert!(feats.centroid_hz > 300.0 && feats.centroid_hz < 700.0);
        assert!(feats.rolloff_hz >= feats.centroid_hz * 0.5);
    }

    #[test]
    fn silence_has_zero_features() {
        let samples = vec![0.0_f32; DEFAULT_SAMPLE_RATE as usize];
        let feats = extract_spectral_aggregates(&samples, DEFAULT_SAMPLE_RATE);
        assert_eq!(feats.centroid_hz, 0.0);
        assert_eq!(feats.rolloff_hz, 0.0);
        assert_eq!(feats.rms, 0.0);
        assert_eq!(feats.zero_crossing_rate, 0.0);
    }

    #[test]
    fn high_frequency_signal_has_high_zcr() {
        let mut samples = Vec::with_capacity(DEFAULT_SAMPLE_RATE as usize / 4);
        for i in 0..samples.capacity() {
            samples.push(if i % 2 == 0 { 0.5 } else { -0.5 });
        }
        let feats = extract_spectral_aggregates(&samples, DEFAULT_SAMPLE_RATE);
        assert!(feats.zero_crossing_rate > 0.9);
    }

    #[test]
    fn constant_signal_rms_matches_amplitude() {
        let samples = vec![0.5_f32; DEFAULT_SAMPLE_RATE as usize / 4];
        assert!((mean_frame_rms(&samples) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn empty_input_yields_one_zero_frame() {
        let frames = magnitude_frames(&[], FRAME_SIZE, HOP_SIZE);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].iter().all(|&m| m == 0.0));
    }

    #[test]
    fn mel_spectrogram_has_expected_shape_and_zero_peak() {
        let samples = sine(440.0, 0.5, DEFAULT_SAMPLE_RATE);
        let mel = mel_spectrogram_db(&samples, DEFAULT_SAMPLE_RATE, 128, 8_000.0);
        assert!(!mel.is_empty());
        assert!(mel.iter().all(|frame| frame.len() == 128));
        let peak = mel
            .iter()
            .flatten()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        assert!(peak.abs() < 1e-3);
    }
}
