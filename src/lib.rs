//! Limit-order-book class prediction server.
//!
//! This crate turns raw LOB snapshots into the fixed-shape tensor a
//! pre-trained BDLOB classifier expects, scores them through ONNX Runtime and
//! answers over line-delimited JSON.

pub mod config;
pub mod error;
pub mod normalize;
pub mod oracle;
pub mod predictor;
pub mod protocol;
pub mod server;

pub use config::{ModelConfig, ServerConfig};
pub use error::{InferenceError, LoadError, PredictError, ProtocolError, ShapeError};
pub use normalize::{NormalizationParams, Normalizer};
pub use oracle::{OnnxOracle, Oracle, StaticOracle};
pub use predictor::{Prediction, PredictionResult, Predictor};
pub use protocol::{Request, Response};
pub use server::{serve, LoopStats};

/// Library-wide error type.
pub type Result<T> = anyhow::Result<T>;
