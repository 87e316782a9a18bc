//! Server configuration.
//!
//! Settings come from an optional YAML file; anything missing falls back to
//! the defaults below. Normalization constants are not configurable, see
//! [`crate::normalize::NormalizationParams::TRAINING`].

use crate::normalize::DEFAULT_SEQUENCE_LENGTH;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the ONNX model file, a relative path from the config file
    /// resolves against the executable's directory
    pub path: PathBuf,

    /// Name of the score output tensor
    pub output_name: String,

    /// Enable full graph optimization
    pub optimize_graph: bool,

    /// Intra-op threads for the session
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/bdlob.onnx"),
            output_name: "output".to_string(),
            optimize_graph: true,
            intra_threads: 1, // Single-threaded for determinism
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub model: ModelConfig,

    /// Timesteps per request the model was trained for, `None` accepts any
    pub sequence_length: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            sequence_length: Some(DEFAULT_SEQUENCE_LENGTH),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// Resolve a model path against the deployment directory.
///
/// Absolute paths are returned unchanged.
pub fn resolve_model_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Choose the model path to load.
///
/// An operator override (CLI flag or environment) is used as given, so a
/// relative override stays relative to the working directory. Otherwise the
/// configured path is resolved against `base_dir`.
pub fn effective_model_path(
    configured: &Path,
    override_path: Option<&Path>,
    base_dir: &Path,
) -> PathBuf {
    match override_path {
        Some(path) => path.to_path_buf(),
        None => resolve_model_path(configured, base_dir),
    }
}

/// Directory of the running executable, or the working directory if it
/// cannot be determined.
pub fn deployment_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
