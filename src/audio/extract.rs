//! Video-to-audio extraction via an ffmpeg subprocess.
//!
//! Produces a temporary 16-bit PCM mono WAV at the target sample rate. The
//! temp file is owned by a [`TempAudio`] guard so it is deleted on every
//! exit path, including when downstream analysis fails.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ExtractionError;

/// RAII guard for an extracted temp WAV; removes the file on drop.
#[derive(Debug)]
pub struct TempAudio {
    path: PathBuf,
}

impl TempAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove temp audio {}: {err}", self.path.display());
            }
        } else {
            tracing::debug!("Cleaned up temp audio: {}", self.path.display());
        }
    }
}

/// Extract the audio track of `video_path` to a temporary mono WAV.
///
/// The input file must exist; a missing input is caller misuse and fails
/// before ffmpeg is invoked.
pub fn extract_audio(video_path: &Path, sample_rate: u32) -> Result<TempAudio, ExtractionError> {
    if !video_path.exists() {
        return Err(ExtractionError::MissingInput {
            path: video_path.to_path_buf(),
        });
    }

    let output = tempfile::Builder::new()
        .prefix("cliptagger-")
        .suffix(".wav")
        .tempfile()
        .map_err(|source| ExtractionError::TempFile { source })?;
    // ffmpeg rewrites the file in place; keep the path, drop the handle.
    let output_path = output.into_temp_path().keep().map_err(|err| {
        ExtractionError::TempFile {
            source: err.error,
        }
    })?;
    let guard = TempAudio {
        path: output_path.clone(),
    };

    let result = Command::new("ffmpeg")
        .arg("-i")
        .arg(video_path)
        .arg("-vn")
        .args(["-acodec", "pcm_s16le"])
        .args(["-ar", &sample_rate.to_string()])
        .args(["-ac", "1"])
        .arg("-y")
        .arg(&output_path)
        .output();

    let result = match result {
        Ok(result) => result,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ExtractionError::ToolMissing);
        }
        Err(err) => {
            return Err(ExtractionError::ToolFailed {
                status: "spawn failed".to_string(),
                stderr: err.to_string(),
            });
        }
    };

    if !result.status.success() {
        return Err(ExtractionError::ToolFailed {
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        });
    }
    if !output_path.exists() {
        return Err(ExtractionError::NoOutput { path: output_path });
    }

    tracing::info!(
        "Extracted audio: {} ({} bytes)",
        guard.path().display(),
        std::fs::metadata(guard.path()).map(|m| m.len()).unwrap_or(0)
    );
    Ok(guard)
}

/// Probe a media file's duration in seconds via ffprobe; 0.0 when the probe
/// fails for any reason.
pub fn probe_duration_seconds(path: &Path) -> f32 {
    let result = Command::new("ffprobe")
        .args(["-v", "error"])
        .args(["-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(path)
        .output();
    match result {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f32>()
            .unwrap_or(0.0),
        Ok(output) => {
            tracing::warn!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            0.0
        }
        Err(err) => {
            tracing::warn!("Could not run ffprobe for {}: {err}", path.display());
            0.0
        }
    }
}
