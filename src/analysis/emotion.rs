//! Speech emotion classification with a wav2vec2 model.
//!
//! Classifies the concatenated speech-only waveform into one of four
//! discrete emotions. Professionally delivered voiceover tends to produce a
//! near-uniform score distribution; scores under the confidence floor are
//! therefore reported as "neutral" rather than trusting the argmax.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array2;
use ort::{session::Session, session::builder::GraphOptimizationLevel, value::Tensor};

use crate::error::AnalysisError;

/// Output head order of the wav2vec2-superb-er checkpoint.
const MODEL_LABELS: [&str; 4] = ["neu", "hap", "ang", "sad"];
/// Speech shorter than this carries too little signal to classify.
const MIN_SPEECH_SECONDS: f32 = 0.5;
/// Long clips are truncated to bound inference cost.
const MAX_SPEECH_SECONDS: f32 = 30.0;

const STAGE: &str = "emotion";

/// wav2vec2 emotion session.
pub struct EmotionClassifier {
    session: Mutex<Session>,
}

impl EmotionClassifier {
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

    /// Classify emotion in speech-only audio as `(label, confidence)`.
    ///
    /// Too-short speech short-circuits to `("none", 1.0)` without invoking
    /// the model.
    pub fn analyze_emotion(
        &self,
        speech_waveform: &[f32],
        sample_rate: u32,
        min_confidence: f32,
    ) -> Result<(String, f32), AnalysisError> {
        let Some(truncated) = prepare_speech(speech_waveform, sample_rate) else {
            tracing::debug!("Speech too short for emotion analysis");
            return Ok(("none".to_string(), 1.0));
        };

        let scores = self.score(truncated)?;
        let mut ranked: Vec<(&'static str, f32)> =
            MODEL_LABELS.iter().copied().zip(scores).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (label, confidence) = resolve_label(&ranked, min_confidence);
        tracing::debug!("Emotion: {label} ({confidence:.2})");
        Ok((label, confidence))
    }

    /// Run the model and return softmax scores in model label order.
    fn score(&self, speech: &[f32]) -> Result<Vec<f32>, AnalysisError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| inference_error("session lock poisoned".to_string()))?;

        let input = Array2::from_shape_vec((1, speech.len()), speech.to_vec())
            .map_err(|err| inference_error(err.to_string()))?;
        let input_tensor = Tensor::from_array(input).map_err(tensor_error)?;

        let outputs = session
            .run(ort::inputs!["input_values" => input_tensor])
            .map_err(|err| inference_error(err.to_string()))?;

        let (_, logits) = outputs
            .get("logits")
            .ok_or_else(|| inference_error("missing logits tensor".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(tensor_error)?;
        if logits.len() < MODEL_LABELS.len() {
            return Err(inference_error(format!(
                "expected {} logits, got {}",
                MODEL_LABELS.len(),
                logits.len()
            )));
        }
        Ok(softmax(&logits[..MODEL_LABELS.len()]))
    }
}

/// Gate and bound the model input: `None` when the speech is too short to
/// classify, otherwise at most the first 30 seconds.
fn prepare_speech(speech_waveform: &[f32], sample_rate: u32) -> Option<&[f32]> {
    if (speech_waveform.len() as f32) < sample_rate as f32 * MIN_SPEECH_SECONDS {
        return None;
    }
    let max_samples = (sample_rate as f32 * MAX_SPEECH_SECONDS) as usize;
    if speech_waveform.len() > max_samples {
        tracing::debug!("Truncated audio to 30s for emotion analysis");
        Some(&speech_waveform[..max_samples])
    } else {
        Some(speech_waveform)
    }
}

/// Pick the final label from ranked `(code, score)` pairs, applying the
/// label map and the confidence floor.
fn resolve_label(ranked: &[(&str, f32)], min_confidence: f32) -> (String, f32) {
    let Some(&(code, confidence)) = ranked.first() else {
        return ("neutral".to_string(), 0.5);
    };
    if confidence < min_confidence {
        tracing::debug!("Low confidence ({confidence:.2}) - classifying as neutral");
        return ("neutral".to_string(), confidence);
    }
    (map_label(code).to_string(), confidence)
}

/// Expand the model's short codes to full words; unknown codes pass through.
fn map_label(code: &str) -> &str {
    match code {
        "neu" => "neutral",
        "hap" => "happy",
        "sad" => "sad",
        "ang" => "angry",
        other => other,
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 {
        return vec![1.0 / logits.len().max(1) as f32; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

fn model_error(err: ort::Error) -> AnalysisError {
    AnalysisError::ModelUnavailable {
        model: "wav2vec2_emotion",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_label_is_expanded_to_full_word() {
        let ranked = [("hap", 0.8_f32), ("neu", 0.1), ("sad", 0.05), ("ang", 0.05)];
        let (label, confidence) = resolve_label(&ranked, 0.25);
        assert_eq!(label, "happy");
        assert!((confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn low_confidence_is_forced_to_neutral() {
        // "angry" tops the ranking but sits under the floor.
        let ranked = [("ang", 0.24_f32), ("neu", 0.23), ("sad", 0.22), ("hap", 0.21)];
        let (label, confidence) = resolve_label(&ranked, 0.25);
        assert_eq!(label, "neutral");
        assert!((confidence - 0.24).abs() < 1e-6);
    }

    #[test]
    fn unknown_codes_pass_through() {
        let ranked = [("sur", 0.9_f32)];
        let (label, _) = resolve_label(&ranked, 0.25);
        assert_eq!(label, "sur");
    }

    #[test]
    fn empty_ranking_defaults_to_neutral() {
        let (label, confidence) = resolve_label(&[], 0.25);
        assert_eq!(label, "neutral");
        assert!((confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn short_speech_is_gated_before_inference() {
        let short = vec![0.1_f32; 7_999]; // just under 0.5s at 16kHz
        assert!(prepare_speech(&short, 16_000).is_none());
        let enough = vec![0.1_f32; 8_000];
        assert_eq!(prepare_speech(&enough, 16_000).unwrap().len(), 8_000);
    }

    #[test]
    fn long_speech_is_truncated_to_thirty_seconds() {
        let long = vec![0.1_f32; 16_000 * 40];
        assert_eq!(prepare_speech(&long, 16_000).unwrap().len(), 16_000 * 30);
    }

    #[test]
    fn softmax_is_a_probability_distribution() {
        let scores = softmax(&[1.0, 2.0, 3.0, 4.0]);
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(scores.windows(2).all(|w| w[0] < w[1]));
    }
}
