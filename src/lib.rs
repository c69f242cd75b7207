//! Audio tagging pipeline for short marketing clips.
/// Composite analysis pipeline (VAD, emotion, prosody, genre).
pub mod analysis;
/// Application directory helpers.
pub mod app_dirs;
/// Audio decoding and video-to-audio extraction.
pub mod audio;
/// Config file loading.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Logging setup.
pub mod logging;
/// Model registry and ONNX artifact setup.
pub mod models;

mod http_client;
