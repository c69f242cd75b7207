//! Process-wide model registry and ONNX artifact setup.
//!
//! Sessions are loaded lazily on first use and cached for the life of the
//! process; there is no eviction. The setup path downloads the ONNX files
//! over https from allowlisted hosts, with bounded size and optional
//! SHA-256 verification.

use std::{
    collections::HashSet,
    env,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use sha2::{Digest, Sha256};
use url::Url;

use crate::analysis::emotion::EmotionClassifier;
use crate::analysis::vad::SileroVad;
use crate::app_dirs;
use crate::error::AnalysisError;
use crate::http_client;

pub const VAD_MODEL_NAME: &str = "silero_vad.onnx";
pub const EMOTION_MODEL_NAME: &str = "wav2vec2_superb_er.onnx";

const DEFAULT_VAD_ONNX_URL: &str =
    "https://github.com/snakers4/silero-vad/raw/master/files/silero_vad.onnx";
const MAX_MODEL_BYTES: usize = 512 * 1024 * 1024;
const ALLOWED_HOSTS_ENV: &str = "CLIPTAGGER_ONNX_ALLOWED_HOSTS";
const ALLOWED_HOSTS: &[&str] = &[
    "github.com",
    "objects.githubusercontent.com",
    "raw.githubusercontent.com",
    "huggingface.co",
    "cdn-lfs.huggingface.co",
];

/// Lazily-loaded inference sessions, shared by reference across the
/// pipeline. Loading is guarded per model so concurrent first use from
/// multiple threads initializes each session exactly once.
pub struct ModelRegistry {
    models_dir: PathBuf,
    vad: Mutex<Option<Arc<SileroVad>>>,
    emotion: Mutex<Option<Arc<EmotionClassifier>>>,
}

impl ModelRegistry {
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            vad: Mutex::new(None),
            emotion: Mutex::new(None),
        }
    }

    /// Registry rooted at the default `.cliptagger/models` directory.
    pub fn from_app_dirs() -> Result<Self, app_dirs::AppDirError> {
        Ok(Self::new(app_dirs::models_dir()?))
    }

    /// The Silero VAD session, loading it on first use.
    pub fn vad(&self) -> Result<Arc<SileroVad>, AnalysisError> {
        let mut slot = self
            .vad
            .lock()
            .map_err(|_| unavailable("silero_vad", "registry lock poisoned".to_string()))?;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let path = self.model_path("silero_vad", VAD_MODEL_NAME)?;
        tracing::info!("Loading Silero VAD model from {}", path.display());
        let model = Arc::new(SileroVad::load(&path)?);
        *slot = Some(Arc::clone(&model));
        tracing::info!("Silero VAD loaded");
        Ok(model)
    }

    /// The wav2vec2 emotion session, loading it on first use.
    pub fn emotion(&self) -> Result<Arc<EmotionClassifier>, AnalysisError> {
        let mut slot = self
            .emotion
            .lock()
            .map_err(|_| unavailable("wav2vec2_emotion", "registry lock poisoned".to_string()))?;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let path = self.model_path("wav2vec2_emotion", EMOTION_MODEL_NAME)?;
        tracing::info!("Loading wav2vec2 emotion model from {}", path.display());
        let model = Arc::new(EmotionClassifier::load(&path)?);
        *slot = Some(Arc::clone(&model));
        tracing::info!("wav2vec2 emotion model loaded");
        Ok(model)
    }

    fn model_path(
        &self,
        model: &'static str,
        file_name: &str,
    ) -> Result<PathBuf, AnalysisError> {
        let path = self.models_dir.join(file_name);
        if !path.exists() {
            return Err(unavailable(
                model,
                format!(
                    "model file {} is missing; run `cliptagger --setup-models`",
                    path.display()
                ),
            ));
        }
        Ok(path)
    }
}

fn unavailable(model: &'static str, detail: String) -> AnalysisError {
    AnalysisError::ModelUnavailable { model, detail }
}

/// Options for preparing the ONNX model artifacts.
#[derive(Debug, Clone, Default)]
pub struct ModelSetupOptions {
    /// Optional HTTPS URL override for the Silero VAD model.
    pub vad_url: Option<String>,
    /// Optional SHA-256 (hex) to verify the VAD download.
    pub vad_sha256: Option<String>,
    /// Optional HTTPS URL for the emotion model; skipped when unset.
    pub emotion_url: Option<String>,
    /// Optional SHA-256 (hex) to verify the emotion download.
    pub emotion_sha256: Option<String>,
    /// Optional override for the models directory location.
    pub models_dir: Option<PathBuf>,
    /// Whether to overwrite existing model artifacts.
    pub force: bool,
}

/// Ensure the model files exist, downloading whatever is missing.
///
/// Returns the paths that are ready after setup. The VAD model has a
/// well-known upstream URL; the emotion model must be configured via
/// `CLIPTAGGER_EMOTION_ONNX_URL` or `--emotion-url` and is skipped (with a
/// warning) otherwise.
pub fn ensure_models(options: ModelSetupOptions) -> Result<Vec<PathBuf>, String> {
    let models_dir = match options.models_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .map_err(|err| format!("Failed to create models dir {}: {err}", dir.display()))?;
            dir
        }
        None => app_dirs::models_dir().map_err(|err| err.to_string())?,
    };
    let allowed_hosts = resolve_allowed_hosts();
    let mut ready = Vec::new();

    let vad_path = models_dir.join(VAD_MODEL_NAME);
    if !vad_path.exists() || options.force {
        let url = resolve_setting(options.vad_url.as_deref(), "CLIPTAGGER_VAD_ONNX_URL")
            .unwrap_or_else(|| DEFAULT_VAD_ONNX_URL.to_string());
        let sha256 = resolve_sha256(options.vad_sha256.as_deref(), "CLIPTAGGER_VAD_ONNX_SHA256")?;
        validate_model_url(&url, &allowed_hosts)?;
        download_to_path(&url, &vad_path, sha256.as_deref())?;
    }
    ready.push(vad_path);

    let emotion_path = models_dir.join(EMOTION_MODEL_NAME);
    if !emotion_path.exists() || options.force {
        match resolve_setting(options.emotion_url.as_deref(), "CLIPTAGGER_EMOTION_ONNX_URL") {
            Some(url) => {
                let sha256 = resolve_sha256(
                    options.emotion_sha256.as_deref(),
                    "CLIPTAGGER_EMOTION_ONNX_SHA256",
                )?;
                validate_model_url(&url, &allowed_hosts)?;
                download_to_path(&url, &emotion_path, sha256.as_deref())?;
                ready.push(emotion_path);
            }
            None => {
                tracing::warn!(
                    "No emotion model URL configured; set CLIPTAGGER_EMOTION_ONNX_URL to \
                     enable emotion classification"
                );
            }
        }
    } else {
        ready.push(emotion_path);
    }

    Ok(ready)
}

fn resolve_setting(explicit: Option<&str>, env_name: &str) -> Option<String> {
    if let Some(value) = explicit {
        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    env::var(env_name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_sha256(explicit: Option<&str>, env_name: &str) -> Result<Option<String>, String> {
    match resolve_setting(explicit, env_name) {
        Some(value) => normalize_sha256(&value).map(Some),
        None => Ok(None),
    }
}

fn resolve_allowed_hosts() -> HashSet<String> {
    let mut hosts: HashSet<String> = ALLOWED_HOSTS.iter().map(|host| host.to_string()).collect();
    if let Ok(value) = env::var(ALLOWED_HOSTS_ENV) {
        for host in value.split(',') {
            let trimmed = host.trim();
            if !trimmed.is_empty() {
                hosts.insert(trimmed.to_string());
            }
        }
    }
    hosts
}

fn validate_model_url(url: &str, allowed_hosts: &HashSet<String>) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|err| format!("Invalid model URL {url}: {err}"))?;
    if parsed.scheme() != "https" {
        return Err(format!("Model URL must use https: {url}"));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| format!("Model URL is missing a host: {url}"))?;
    if !allowed_hosts.contains(host) {
        return Err(format!(
            "Model URL host '{host}' is not allowlisted; set {ALLOWED_HOSTS_ENV} to allow it."
        ));
    }
    Ok(())
}

fn normalize_sha256(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.len() != 64 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!(
            "Invalid SHA-256 value; expected 64 hex characters, got '{trimmed}'."
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

fn download_to_path(
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<(), String> {
    tracing::info!("Downloading {url}");
    let response = http_client::agent()
        .get(url)
        .call()
        .map_err(|err| format!("Failed to download {url}: {err}"))?;
    if response.status() >= 400 {
        return Err(format!(
            "Failed to download {url}: HTTP {}",
            response.status()
        ));
    }
    let tmp = dest.with_extension("tmp");
    let mut file =
        File::create(&tmp).map_err(|err| format!("Failed to write {}: {err}", tmp.display()))?;
    http_client::copy_response_to_writer(response, &mut file, MAX_MODEL_BYTES)
        .map_err(|err| format!("Failed to write {}: {err}", tmp.display()))?;
    file.flush()
        .map_err(|err| format!("Failed to flush {}: {err}", tmp.display()))?;

    let actual_sha256 = sha256_file(&tmp)?;
    match expected_sha256 {
        Some(expected) if actual_sha256 != expected => {
            let _ = fs::remove_file(&tmp);
            return Err(format!(
                "SHA-256 mismatch for {url}: expected {expected}, got {actual_sha256}."
            ));
        }
        Some(_) => {}
        None => {
            tracing::info!("Downloaded {url} with SHA-256 {actual_sha256} (unverified)");
        }
    }
    fs::rename(&tmp, dest).map_err(|err| format!("Failed to move {}: {err}", dest.display()))?;
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String, String> {
    let mut file =
        File::open(path).map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
