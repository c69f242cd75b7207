//! Error taxonomy for the audio tagging pipeline.
//!
//! Extraction and decode problems carry their own types so callers can tell
//! caller misuse (bad input path) apart from data-quality failures. Stage
//! failures inside a pipeline run are `AnalysisError`s; the orchestrator
//! catches those and degrades instead of aborting the run.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while demuxing a video container to a temporary WAV file.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The input file does not exist. Precondition failure; propagates.
    #[error("Input file not found: {path}")]
    MissingInput { path: PathBuf },
    /// ffmpeg is not installed or not on PATH.
    #[error("ffmpeg not found; install ffmpeg to extract audio from video")]
    ToolMissing,
    /// ffmpeg ran but exited non-zero.
    #[error("ffmpeg failed ({status}): {stderr}")]
    ToolFailed { status: String, stderr: String },
    /// ffmpeg exited zero but the output file is missing.
    #[error("ffmpeg did not create output file: {path}")]
    NoOutput { path: PathBuf },
    /// Could not allocate the temporary output file.
    #[error("Failed to create temporary audio file: {source}")]
    TempFile { source: std::io::Error },
}

/// Failures while decoding an audio file into a waveform.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unsupported or corrupt audio in {path}: {detail}")]
    Unsupported { path: PathBuf, detail: String },
    #[error("Decoded 0 samples from {path}")]
    Empty { path: PathBuf },
}

/// Stage-local analysis failures, tagged by kind so callers can distinguish
/// "feature unavailable" from "analysis failed on this input".
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required model file or runtime is not available on this machine.
    #[error("Model '{model}' unavailable: {detail}")]
    ModelUnavailable { model: &'static str, detail: String },
    /// Model inference ran and failed.
    #[error("{stage} inference failed: {detail}")]
    Inference { stage: &'static str, detail: String },
    /// Signal-processing stage failed on this input.
    #[error("{stage} analysis failed: {detail}")]
    Analysis { stage: &'static str, detail: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
