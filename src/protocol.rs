//! Line-delimited JSON envelopes.
//!
//! Request: `{"id": <any>, "action": "predict", "data": <LOB snapshot>}`.
//! Responses echo `id` untouched and carry either `prediction` or a top-level
//! `error`.

use crate::error::ProtocolError;
use crate::predictor::PredictionResult;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Action name that triggers a prediction.
pub const PREDICT_ACTION: &str = "predict";

/// Id echoed when the request id cannot be recovered.
pub const UNKNOWN_ID: &str = "unknown";

fn unknown_id() -> Value {
    Value::String(UNKNOWN_ID.to_string())
}

/// Keeps an explicit `null` distinct from an absent field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    /// Opaque caller state, echoed back verbatim
    #[serde(default = "unknown_id")]
    pub id: Value,

    #[serde(default)]
    pub action: Value,

    /// LOB snapshot, `None` when the key is absent
    #[serde(default, deserialize_with = "present")]
    pub data: Option<Value>,
}

impl Request {
    /// Parse one request line.
    pub fn from_line(line: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn is_predict(&self) -> bool {
        self.action.as_str() == Some(PREDICT_ACTION)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Prediction {
        id: Value,
        prediction: PredictionResult,
    },
    Error {
        id: Value,
        error: String,
    },
}

impl Response {
    pub fn prediction(id: Value, prediction: PredictionResult) -> Self {
        Response::Prediction { id, prediction }
    }

    /// Error response for a line whose id could not be recovered.
    pub fn protocol_error(err: &ProtocolError) -> Self {
        Self::request_error(unknown_id(), err)
    }

    /// Error response for a parsed request that cannot be served.
    pub fn request_error(id: Value, err: &ProtocolError) -> Self {
        Response::Error {
            id,
            error: err.to_string(),
        }
    }

    pub fn id(&self) -> &Value {
        match self {
            Response::Prediction { id, .. } | Response::Error { id, .. } => id,
        }
    }
}
