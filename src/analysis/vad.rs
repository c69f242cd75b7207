//! Voice activity detection via the Silero VAD ONNX model.
//!
//! The model scores 512-sample chunks (32 ms at 16 kHz) with stateful LSTM
//! inference; the per-chunk probabilities are then segmented with hysteresis
//! so sub-threshold flicker does not fragment the speech timeline.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array2;
use ort::{session::Session, session::builder::GraphOptimizationLevel, value::Tensor};

use crate::analysis::segments::SpeechSegment;
use crate::audio::Waveform;
use crate::config::AudioConfig;
use crate::error::AnalysisError;

/// Chunk size the model was trained on (32 ms at 16 kHz).
pub const VAD_CHUNK_SIZE: usize = 512;
/// Hysteresis: once triggered, a segment ends only after the probability
/// drops this far below the entry threshold for long enough.
const EXIT_THRESHOLD_OFFSET: f32 = 0.15;

const STAGE: &str = "vad";

/// Thresholds controlling speech segmentation.
#[derive(Debug, Clone, Copy)]
pub struct VadOptions {
    pub threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,
}

impl Default for VadOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 100,
        }
    }
}

impl From<&AudioConfig> for VadOptions {
    fn from(config: &AudioConfig) -> Self {
        Self {
            threshold: config.vad_threshold,
            min_speech_duration_ms: config.min_speech_duration_ms,
            min_silence_duration_ms: config.min_silence_duration_ms,
        }
    }
}

/// Silero VAD session. Cheap to share behind `Arc`; inference serializes on
/// an internal lock because the LSTM state threads through chunk order.
pub struct SileroVad {
    session: Mutex<Session>,
}

impl SileroVad {
    /// Load the ONNX model from disk.
    pub fn load(model_path: &Path) -> Result<Self, AnalysisError> {
        let session = Session::builder()
            .map_err(model_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_error)?
            .with_intra_threads(1)
            .map_err(model_error)?
            .commit_from_file(model_path)
            .map_err(model_error)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Detect speech in a waveform. Returns `(has_speech, segments)` with
    /// chronologically ordered, disjoint segments.
    pub fn detect_speech(
        &self,
        waveform: &Waveform,
        options: &VadOptions,
    ) -> Result<(bool, Vec<SpeechSegment>), AnalysisError> {
        let probabilities = self.speech_probabilities(&waveform.samples, waveform.sample_rate)?;
        let segments = segments_from_probabilities(
            &probabilities,
            waveform.samples.len(),
            waveform.sample_rate,
            options,
        );
        let total_speech: f32 = segments.iter().map(|s| s.duration()).sum();
        tracing::debug!(
            "VAD: {} segments, {total_speech:.1}s total speech",
            segments.len()
        );
        Ok((!segments.is_empty(), segments))
    }

    /// Run the model over consecutive chunks, threading the LSTM state.
    fn speech_probabilities(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<f32>, AnalysisError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| inference_error("session lock poisoned".to_string()))?;

        let mut h_state = Array2::<f32>::zeros((2, 64));
        let mut c_state = Array2::<f32>::zeros((2, 64));
        let mut probabilities = Vec::with_capacity(samples.len() / VAD_CHUNK_SIZE + 1);

        let mut start = 0usize;
        while start < samples.len() {
            let end = (start + VAD_CHUNK_SIZE).min(samples.len());
            let mut chunk = samples[start..end].to_vec();
            chunk.resize(VAD_CHUNK_SIZE, 0.0);

            let input = Array2::from_shape_vec((1, VAD_CHUNK_SIZE), chunk)
                .map_err(|err| inference_error(err.to_string()))?;
            let sr = ndarray::arr1(&[sample_rate as i64]);

            let input_tensor = Tensor::from_array(input).map_err(tensor_error)?;
            let sr_tensor = Tensor::from_array(sr).map_err(tensor_error)?;
            let h_tensor = Tensor::from_array(h_state.clone()).map_err(tensor_error)?;
            let c_tensor = Tensor::from_array(c_state.clone()).map_err(tensor_error)?;

            let outputs = session
                .run(ort::inputs![
                    "input" => input_tensor,
                    "sr" => sr_tensor,
                    "h" => h_tensor,
                    "c" => c_tensor,
                ])
                .map_err(|err| inference_error(err.to_string()))?;

            let (_, speech_data) = outputs
                .get("output")
                .ok_or_else(|| inference_error("missing output tensor".to_string()))?
                .try_extract_tensor::<f32>()
                .map_err(tensor_error)?;
            probabilities.push(speech_data.first().copied().unwrap_or(0.0));

            update_state(&outputs, "hn", &mut h_state)?;
            update_state(&outputs, "cn", &mut c_state)?;

            start += VAD_CHUNK_SIZE;
        }

        Ok(probabilities)
    }
}

fn update_state(
    outputs: &ort::session::SessionOutputs<'_, '_>,
    name: &str,
    state: &mut Array2<f32>,
) -> Result<(), AnalysisError> {
    let Some(value) = outputs.get(name) else {
        return Ok(());
    };
    let (shape, data) = value.try_extract_tensor::<f32>().map_err(tensor_error)?;
    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    if dims.len() == 2 && data.len() == dims[0] * dims[1] {
        let view = ndarray::ArrayView2::from_shape((dims[0], dims[1]), data)
            .map_err(|err| inference_error(err.to_string()))?;
        state.assign(&view);
    }
    Ok(())
}

fn model_error(err: ort::Error) -> AnalysisError {
    AnalysisError::ModelUnavailable {
        model: "silero_vad",
        detail: err.to_string(),
    }
}

fn tensor_error(err: ort::Error) -> AnalysisError {
    inference_error(err.to_string())
}

fn inference_error(detail: String) -> AnalysisError {
    AnalysisError::Inference {
        stage: STAGE,
        detail,
    }
}

/// Turn per-chunk probabilities into speech segments.
///
/// Entry at `threshold`, exit only after the probability stays below
/// `threshold - EXIT_THRESHOLD_OFFSET` for at least the minimum silence
/// duration. Segments shorter than the minimum speech duration are dropped.
pub(crate) fn segments_from_probabilities(
    probabilities: &[f32],
    total_samples: usize,
    sample_rate: u32,
    options: &VadOptions,
) -> Vec<SpeechSegment> {
    let sr = sample_rate.max(1) as f32;
    let exit_threshold = (options.threshold - EXIT_THRESHOLD_OFFSET).max(0.01);
    let min_speech_samples = (sr * options.min_speech_duration_ms as f32 / 1_000.0) as usize;
    let min_silence_samples = (sr * options.min_silence_duration_ms as f32 / 1_000.0) as usize;

    let mut segments = Vec::new();
    let mut triggered = false;
    let mut segment_start = 0usize;
    let mut silence_start: Option<usize> = None;

    for (chunk, &probability) in probabilities.iter().enumerate() {
        let chunk_start = chunk * VAD_CHUNK_SIZE;
        let chunk_end = (chunk_start + VAD_CHUNK_SIZE).min(total_samples);

        if probability >= options.threshold {
            if !triggered {
                triggered = true;
                segment_start = chunk_start;
            }
            silence_start = None;
        } else if triggered && probability < exit_threshold {
            let silence_began = *silence_start.get_or_insert(chunk_start);
            if chunk_end.saturating_sub(silence_began) >= min_silence_samples {
                push_segment(
                    &mut segments,
                    segment_start,
                    silence_began,
                    min_speech_samples,
                    sr,
                );
                triggered = false;
                silence_start = None;
            }
        }
    }

    if triggered {
        let end = silence_start.unwrap_or(total_samples);
        push_segment(&mut segments, segment_start, end, min_speech_samples, sr);
    }

    segments
}

fn push_segment(
    segments: &mut Vec<SpeechSegment>,
    start_sample: usize,
    end_sample: usize,
    min_speech_samples: usize,
    sample_rate: f32,
) {
    if end_sample.saturating_sub(start_sample) < min_speech_samples {
        return;
    }
    segments.push(SpeechSegment::new(
        start_sample as f32 / sample_rate,
        end_sample as f32 / sample_rate,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16_000;

    fn options() -> VadOptions {
        VadOptions::default()
    }

    /// Chunks per second at the model chunk size: 16000 / 512 = 31.25.
    fn probs(spans: &[(usize, usize, f32)], total_chunks: usize) -> Vec<f32> {
        let mut probabilities = vec![0.0_f32; total_chunks];
        for &(start, end, p) in spans {
            for value in &mut probabilities[start..end] {
                *value = p;
            }
        }
        probabilities
    }

    #[test]
    fn silence_produces_no_segments() {
        let probabilities = vec![0.0_f32; 100];
        let segments =
            segments_from_probabilities(&probabilities, 100 * VAD_CHUNK_SIZE, SR, &options());
        assert!(segments.is_empty());
    }

    #[test]
    fn sustained_speech_produces_one_segment() {
        // Chunks 10..70 speak: ~1.9s, well above the 250ms minimum.
        let probabilities = probs(&[(10, 70, 0.9)], 100);
        let segments =
            segments_from_probabilities(&probabilities, 100 * VAD_CHUNK_SIZE, SR, &options());
        assert_eq!(segments.len(), 1);
        let expected_start = 10.0 * VAD_CHUNK_SIZE as f32 / SR as f32;
        assert!((segments[0].start_sec - expected_start).abs() < 1e-3);
        assert!(segments[0].end_sec > segments[0].start_sec);
    }

    #[test]
    fn short_blips_are_dropped() {
        // 3 chunks of speech = ~96ms, below the 250ms minimum.
        let probabilities = probs(&[(10, 13, 0.9)], 100);
        let segments =
            segments_from_probabilities(&probabilities, 100 * VAD_CHUNK_SIZE, SR, &options());
        assert!(segments.is_empty());
    }

    #[test]
    fn brief_dips_do_not_split_a_segment() {
        // A 2-chunk (~64ms) dip is shorter than the 100ms minimum silence.
        let probabilities = probs(&[(10, 40, 0.9), (42, 70, 0.9)], 100);
        let segments =
            segments_from_probabilities(&probabilities, 100 * VAD_CHUNK_SIZE, SR, &options());
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn long_silence_splits_segments() {
        // A 20-chunk (~640ms) silence exceeds the minimum and splits.
        let probabilities = probs(&[(0, 30, 0.9), (50, 80, 0.9)], 100);
        let segments =
            segments_from_probabilities(&probabilities, 100 * VAD_CHUNK_SIZE, SR, &options());
        assert_eq!(segments.len(), 2);
        assert!(segments[0].end_sec <= segments[1].start_sec);
    }

    #[test]
    fn segments_are_chronological_and_disjoint() {
        let probabilities = probs(&[(0, 20, 0.9), (40, 60, 0.9), (80, 99, 0.9)], 100);
        let segments =
            segments_from_probabilities(&probabilities, 100 * VAD_CHUNK_SIZE, SR, &options());
        assert_eq!(segments.len(), 3);
        for pair in segments.windows(2) {
            assert!(pair[0].end_sec <= pair[1].start_sec);
        }
    }

    #[test]
    fn speech_running_to_the_end_is_closed() {
        let probabilities = probs(&[(80, 100, 0.9)], 100);
        let total_samples = 100 * VAD_CHUNK_SIZE;
        let segments = segments_from_probabilities(&probabilities, total_samples, SR, &options());
        assert_eq!(segments.len(), 1);
        let expected_end = total_samples as f32 / SR as f32;
        assert!((segments[0].end_sec - expected_end).abs() < 1e-3);
    }

    #[test]
    fn mid_band_probability_sustains_but_does_not_start_speech() {
        // 0.4 sits between the exit threshold (0.35) and entry (0.5):
        // it must not trigger on its own.
        let probabilities = probs(&[(0, 50, 0.4)], 50);
        let segments =
            segments_from_probabilities(&probabilities, 50 * VAD_CHUNK_SIZE, SR, &options());
        assert!(segments.is_empty());
    }
}
