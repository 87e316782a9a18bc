//! Error taxonomy for the prediction pipeline.
//!
//! Every variant here is recovered into a response line by the request loop;
//! none of them terminates the server.

use std::path::PathBuf;
use thiserror::Error;

/// The LOB payload could not be reconciled to a `(1, 1, T, 80)` tensor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("unexpected LOB shape {0:?}, expected (T, 20, 4), (T, 80) or a flat T*80 array")]
    Unsupported(Vec<usize>),

    #[error("ragged LOB array at depth {depth}: expected length {expected}, got {actual}")]
    Ragged {
        depth: usize,
        expected: usize,
        actual: usize,
    },

    #[error("non-numeric value in LOB payload at depth {0}")]
    NonNumeric(usize),

    #[error("cannot reshape 1-D array of length {0} into rows of 80 features")]
    NotDivisible(usize),

    #[error("LOB payload contains no timesteps")]
    Empty,

    #[error("expected {expected} timesteps, got {actual}")]
    TimestepMismatch { expected: usize, actual: usize },
}

/// The model could not be loaded at startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to load model from {}: {reason}", .path.display())]
    Runtime { path: PathBuf, reason: String },
}

/// The model was invoked but did not produce usable scores.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("{0}")]
    Runtime(String),

    #[error("model output '{0}' not found")]
    MissingOutput(String),

    #[error("model returned no scores")]
    EmptyOutput,

    #[error("model returned non-finite score at index {0}")]
    NonFinite(usize),
}

/// A request line could not be turned into a request object.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request line is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0}")]
    Malformed(#[from] serde_json::Error),

    #[error("request must be a JSON object")]
    NotAnObject,

    #[error("missing field `data`")]
    MissingData,
}

/// Failure surfaced by the predictor as the in-band `{"error": ...}` result.
///
/// The `Display` strings are part of the wire protocol.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("failed to preprocess data")]
    Preprocess(#[source] ShapeError),

    #[error("prediction failed: {0}")]
    Inference(#[source] InferenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_error_wire_strings() {
        assert_eq!(PredictError::ModelNotLoaded.to_string(), "model not loaded");
        assert_eq!(
            PredictError::Preprocess(ShapeError::NotDivisible(81)).to_string(),
            "failed to preprocess data"
        );
        assert_eq!(
            PredictError::Inference(InferenceError::EmptyOutput).to_string(),
            "prediction failed: model returned no scores"
        );
    }

    #[test]
    fn test_shape_error_messages() {
        let err = ShapeError::TimestepMismatch {
            expected: 4500,
            actual: 10,
        };
        assert_eq!(err.to_string(), "expected 4500 timesteps, got 10");
        assert!(ShapeError::Unsupported(vec![3, 7])
            .to_string()
            .contains("[3, 7]"));
    }
}
