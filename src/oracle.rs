//! Model runtime seam.
//!
//! The predictor only sees the [`Oracle`] trait. [`OnnxOracle`] wraps an ONNX
//! Runtime session loaded once at startup; [`StaticOracle`] returns fixed
//! scores and stands in for the model in tests and dry runs.

use crate::config::ModelConfig;
use crate::error::{InferenceError, LoadError};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// A loaded classifier mapping a canonical LOB tensor to raw class scores.
pub trait Oracle {
    /// Score one `(1, 1, T, 80)` tensor.
    fn infer(&mut self, tensor: Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

/// ONNX Runtime backed oracle.
pub struct OnnxOracle {
    /// ONNX Runtime session
    session: Session,

    /// Name of the score tensor in the model outputs
    output_name: String,
}

impl OnnxOracle {
    /// Load an ONNX model.
    ///
    /// # Example
    /// ```no_run
    /// use bdlob_inference::{ModelConfig, OnnxOracle};
    ///
    /// let oracle = OnnxOracle::load(&ModelConfig::default()).unwrap();
    /// ```
    pub fn load(config: &ModelConfig) -> Result<Self, LoadError> {
        let path = config.path.as_path();
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        info!(path = %path.display(), "loading model");
        let session = build_session(path, config).map_err(|err| LoadError::Runtime {
            path: path.to_path_buf(),
            reason: format!("{err:#}"),
        })?;

        let available: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let output_name = match select_output(&config.output_name, &available) {
            Some(name) => name.to_string(),
            None => {
                warn!(
                    configured = %config.output_name,
                    available = ?available,
                    "configured model output not found"
                );
                config.output_name.clone()
            }
        };
        info!(output = %output_name, "reading scores from model output");

        Ok(Self {
            session,
            output_name,
        })
    }
}

/// Pick the score output: the configured name when the model has it,
/// otherwise the model's only output.
fn select_output<'a>(configured: &'a str, available: &'a [String]) -> Option<&'a str> {
    if available.iter().any(|name| name == configured) {
        return Some(configured);
    }
    match available {
        [only] => Some(only.as_str()),
        _ => None,
    }
}

fn build_session(path: &Path, config: &ModelConfig) -> crate::Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(if config.optimize_graph {
            GraphOptimizationLevel::Level3
        } else {
            GraphOptimizationLevel::Level1
        })?
        .with_intra_threads(config.intra_threads)?
        .commit_from_file(path)?;
    Ok(session)
}

fn runtime<E: std::fmt::Display>(err: E) -> InferenceError {
    InferenceError::Runtime(err.to_string())
}

impl Oracle for OnnxOracle {
    fn infer(&mut self, tensor: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        debug!(shape = ?tensor.shape(), "input tensor");
        let input = Value::from_array(tensor).map_err(runtime)?;

        let outputs = self.session.run(ort::inputs![input]).map_err(runtime)?;
        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| InferenceError::MissingOutput(self.output_name.clone()))?;

        let (shape, scores) = output.try_extract_tensor::<f32>().map_err(runtime)?;
        debug!(shape = ?shape, "raw model output");
        Ok(scores.to_vec())
    }
}

/// Oracle that ignores its input and returns the same scores every time.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticOracle {
    scores: Vec<f32>,
}

impl StaticOracle {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }
}

impl Oracle for StaticOracle {
    fn infer(&mut self, _tensor: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        Ok(self.scores.clone())
    }
}
