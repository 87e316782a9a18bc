//! LOB snapshot normalization for model inputs.
//!
//! Converts raw limit-order-book payloads into the `(1, 1, T, 80)` tensor the
//! BDLOB model was trained on. Each timestep holds 20 levels of
//! `(bid_price, bid_volume, ask_price, ask_volume)`, flattened to 80 features.
//!
//! **Critical for correctness**: the scaling constants must match the ones
//! used during training to avoid train/serve skew.

use crate::error::ShapeError;
use ndarray::Array4;
use serde_json::Value;
use tracing::debug;

/// Number of book levels per side-pair in one timestep.
pub const LEVELS: usize = 20;

/// Values per level: bid price, bid volume, ask price, ask volume.
pub const FIELDS_PER_LEVEL: usize = 4;

/// Features per timestep after flattening levels.
pub const FEATURES: usize = LEVELS * FIELDS_PER_LEVEL;

/// Sequence length the shipped model was trained with.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 4500;

/// Deepest nesting accepted on the wire, `(T, 20, 4)`.
const MAX_RANK: usize = 3;

/// Affine scaling constants for price and volume features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationParams {
    pub price_mean: f64,
    pub price_scale: f64,
    pub volume_mean: f64,
    pub volume_scale: f64,
}

impl NormalizationParams {
    /// Constants used when the model was trained.
    pub const TRAINING: Self = Self {
        price_mean: 100_000.0,
        price_scale: 5_000.0,
        volume_mean: 0.2,
        volume_scale: 1.0,
    };

    /// Scale a raw value according to its feature index.
    ///
    /// Even indices are prices, odd indices are volumes.
    #[inline]
    pub fn apply(&self, feature: usize, raw: f64) -> f64 {
        if feature % 2 == 0 {
            (raw - self.price_mean) / self.price_scale
        } else {
            (raw - self.volume_mean) / self.volume_scale
        }
    }
}

impl Default for NormalizationParams {
    fn default() -> Self {
        Self::TRAINING
    }
}

/// Validates and scales LOB payloads into canonical model tensors.
#[derive(Debug, Clone)]
pub struct Normalizer {
    params: NormalizationParams,
    expected_timesteps: Option<usize>,
}

impl Normalizer {
    /// Create a normalizer.
    ///
    /// # Arguments
    /// * `expected_timesteps` - Required `T`, or `None` to accept any length
    pub fn new(expected_timesteps: Option<usize>) -> Self {
        Self {
            params: NormalizationParams::TRAINING,
            expected_timesteps,
        }
    }

    /// Normalize a raw LOB payload.
    ///
    /// Accepts `(T, 20, 4)`, `(T, 80)` or a flat array of `T * 80` numbers and
    /// returns a `(1, 1, T, 80)` single-precision tensor.
    pub fn normalize(&self, payload: &Value) -> Result<Array4<f32>, ShapeError> {
        let (dims, raw) = flatten(payload)?;
        debug!(shape = ?dims, "raw LOB payload");

        let timesteps = timesteps_for(&dims, raw.len())?;
        if timesteps == 0 {
            return Err(ShapeError::Empty);
        }
        if let Some(expected) = self.expected_timesteps {
            if expected != timesteps {
                return Err(ShapeError::TimestepMismatch {
                    expected,
                    actual: timesteps,
                });
            }
        }

        log_range("input", &raw);

        let scaled: Vec<f32> = raw
            .chunks_exact(FEATURES)
            .flat_map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, &v)| self.params.apply(j, v) as f32)
            })
            .collect();

        if tracing::enabled!(tracing::Level::DEBUG) {
            let widened: Vec<f64> = scaled.iter().map(|&v| v as f64).collect();
            log_range("normalized", &widened);
        }

        // Length is timesteps * FEATURES by construction of `timesteps_for`.
        Array4::from_shape_vec((1, 1, timesteps, FEATURES), scaled)
            .map_err(|_| ShapeError::NotDivisible(raw.len()))
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Some(DEFAULT_SEQUENCE_LENGTH))
    }
}

/// Map an inferred raw shape onto a timestep count.
fn timesteps_for(dims: &[usize], len: usize) -> Result<usize, ShapeError> {
    match *dims {
        [t, LEVELS, FIELDS_PER_LEVEL] => Ok(t),
        [t, FEATURES] => Ok(t),
        [n] if n % FEATURES == 0 => Ok(n / FEATURES),
        [n] => Err(ShapeError::NotDivisible(n)),
        _ => {
            debug!(shape = ?dims, len, "unsupported LOB shape");
            Err(ShapeError::Unsupported(dims.to_vec()))
        }
    }
}

/// Infer the rectangular shape of nested JSON arrays and collect the leaves
/// in row-major order.
fn flatten(payload: &Value) -> Result<(Vec<usize>, Vec<f64>), ShapeError> {
    let mut dims = Vec::with_capacity(MAX_RANK);
    let mut cursor = payload;
    while let Value::Array(items) = cursor {
        dims.push(items.len());
        if dims.len() > MAX_RANK {
            return Err(ShapeError::Unsupported(dims));
        }
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    if dims.is_empty() {
        return Err(ShapeError::Unsupported(dims));
    }

    let mut values = Vec::with_capacity(dims.iter().product());
    collect(payload, &dims, 0, &mut values)?;
    Ok((dims, values))
}

fn collect(
    value: &Value,
    dims: &[usize],
    depth: usize,
    out: &mut Vec<f64>,
) -> Result<(), ShapeError> {
    if depth == dims.len() {
        return match value.as_f64() {
            Some(v) => {
                out.push(v);
                Ok(())
            }
            None if value.is_array() => Err(ShapeError::Unsupported(dims.to_vec())),
            None => Err(ShapeError::NonNumeric(depth)),
        };
    }

    let items = match value {
        Value::Array(items) => items,
        _ => {
            return Err(ShapeError::Ragged {
                depth,
                expected: dims[depth],
                actual: 0,
            })
        }
    };
    if items.len() != dims[depth] {
        return Err(ShapeError::Ragged {
            depth,
            expected: dims[depth],
            actual: items.len(),
        });
    }
    for item in items {
        collect(item, dims, depth + 1, out)?;
    }
    Ok(())
}

fn log_range(stage: &str, values: &[f64]) {
    if values.is_empty() || !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let (min, max, sum) = values.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
    );
    debug!(
        stage,
        min,
        max,
        mean = sum / values.len() as f64,
        "LOB value range"
    );
}
