//! LOB class prediction.
//!
//! Provides the [`Predictor`], which normalizes a raw LOB payload, scores it
//! with the loaded [`Oracle`] and turns the raw scores into a class
//! probability distribution.

use crate::error::{InferenceError, PredictError};
use crate::normalize::Normalizer;
use crate::oracle::Oracle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Successful prediction for one LOB snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index of the most probable class
    pub prediction_class: usize,

    /// Softmax distribution over classes, sums to 1
    pub probabilities: Vec<f32>,

    /// Probability of `prediction_class`
    pub confidence: f32,
}

impl Prediction {
    /// Build a prediction from raw model scores.
    pub fn from_scores(scores: &[f32]) -> Result<Self, InferenceError> {
        if scores.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
            return Err(InferenceError::NonFinite(idx));
        }

        let probabilities = softmax(scores);
        let (prediction_class, confidence) =
            argmax(&probabilities).ok_or(InferenceError::EmptyOutput)?;

        Ok(Self {
            prediction_class,
            probabilities,
            confidence,
        })
    }
}

/// Result placed in the `prediction` field of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResult {
    Success(Prediction),
    Failure { error: String },
}

impl From<Result<Prediction, PredictError>> for PredictionResult {
    fn from(result: Result<Prediction, PredictError>) -> Self {
        match result {
            Ok(prediction) => PredictionResult::Success(prediction),
            Err(err) => PredictionResult::Failure {
                error: err.to_string(),
            },
        }
    }
}

/// Exponential normalization of raw scores.
///
/// Shifted by the maximum score so large logits do not overflow.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the first maximal element.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
}

/// Orchestrates normalization and model scoring for one request at a time.
///
/// The oracle is owned by the caller and lent for the predictor's lifetime;
/// `None` means the model failed to load.
pub struct Predictor<'o, O: Oracle + ?Sized> {
    oracle: Option<&'o mut O>,
    normalizer: Normalizer,
}

impl<'o, O: Oracle + ?Sized> Predictor<'o, O> {
    pub fn new(oracle: Option<&'o mut O>, normalizer: Normalizer) -> Self {
        Self { oracle, normalizer }
    }

    pub fn is_loaded(&self) -> bool {
        self.oracle.is_some()
    }

    /// Predict the class of a raw LOB payload.
    ///
    /// Never fails; errors are returned as [`PredictionResult::Failure`].
    pub fn predict(&mut self, data: &Value) -> PredictionResult {
        let result = self.try_predict(data);
        if let Err(err) = &result {
            match std::error::Error::source(err) {
                Some(cause) => warn!(error = %err, cause = %cause, "prediction request failed"),
                None => warn!(error = %err, "prediction request failed"),
            }
        }
        result.into()
    }

    /// Predict the class of a raw LOB payload, keeping the typed error.
    pub fn try_predict(&mut self, data: &Value) -> Result<Prediction, PredictError> {
        let oracle = self.oracle.as_deref_mut().ok_or(PredictError::ModelNotLoaded)?;

        let tensor = self
            .normalizer
            .normalize(data)
            .map_err(PredictError::Preprocess)?;
        debug!(shape = ?tensor.shape(), "preprocessed LOB tensor");

        let scores = oracle.infer(tensor).map_err(PredictError::Inference)?;
        let prediction = Prediction::from_scores(&scores).map_err(PredictError::Inference)?;

        debug!(
            class = prediction.prediction_class,
            confidence = prediction.confidence,
            probabilities = ?prediction.probabilities,
            "prediction"
        );
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::FEATURES;
    use crate::oracle::StaticOracle;
    use ndarray::Array4;
    use serde_json::json;

    struct FailingOracle;

    impl Oracle for FailingOracle {
        fn infer(&mut self, _tensor: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            Err(InferenceError::Runtime("device lost".to_string()))
        }
    }

    fn payload(timesteps: usize) -> Value {
        json!(vec![vec![[100000, 1, 100001, 1]; 20]; timesteps])
    }

    #[test]
    fn test_softmax_sums_to_one() {
        for scores in [
            vec![0.0, 0.0, 0.0],
            vec![1.0, 2.0, 3.0],
            vec![-50.0, 0.5, 80.0, 1e3],
            vec![7.5],
        ] {
            let p = softmax(&scores);
            let sum: f32 = p.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "scores {:?} sum {}", scores, sum);
            assert!(p.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_softmax_matches_definition() {
        let scores = [0.2f32, -1.3, 0.9];
        let denom: f32 = scores.iter().map(|s| s.exp()).sum();
        for (p, s) in softmax(&scores).iter().zip(scores.iter()) {
            assert!((p - s.exp() / denom).abs() < 1e-6);
        }
    }

    #[test]
    fn test_argmax_ties_pick_lowest_index() {
        assert_eq!(argmax(&[0.25, 0.5, 0.5, 0.25]), Some((1, 0.5)));
        assert_eq!(argmax(&[1.0, 1.0]), Some((0, 1.0)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_prediction_from_scores() {
        let prediction = Prediction::from_scores(&[0.1, 2.0, -0.5]).unwrap();
        assert_eq!(prediction.prediction_class, 1);
        let max = prediction
            .probabilities
            .iter()
            .copied()
            .fold(f32::MIN, f32::max);
        assert_eq!(prediction.confidence, max);
    }

    #[test]
    fn test_prediction_from_tied_scores() {
        let prediction = Prediction::from_scores(&[3.0, 3.0, 3.0]).unwrap();
        assert_eq!(prediction.prediction_class, 0);
        assert!((prediction.confidence - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_prediction_from_bad_scores() {
        assert_eq!(
            Prediction::from_scores(&[]).unwrap_err(),
            InferenceError::EmptyOutput
        );
        assert_eq!(
            Prediction::from_scores(&[0.0, f32::NAN]).unwrap_err(),
            InferenceError::NonFinite(1)
        );
    }

    #[test]
    fn test_predict_model_not_loaded() {
        let mut predictor: Predictor<StaticOracle> = Predictor::new(None, Normalizer::new(Some(3)));
        assert!(!predictor.is_loaded());
        assert_eq!(
            predictor.predict(&payload(3)),
            PredictionResult::Failure {
                error: "model not loaded".to_string()
            }
        );
    }

    #[test]
    fn test_predict_preprocess_failure() {
        let mut oracle = StaticOracle::new(vec![0.0, 1.0, 0.0]);
        let mut predictor = Predictor::new(Some(&mut oracle), Normalizer::new(None));
        let result = predictor.predict(&json!(vec![1.0; FEATURES + 1]));
        assert_eq!(
            result,
            PredictionResult::Failure {
                error: "failed to preprocess data".to_string()
            }
        );
    }

    #[test]
    fn test_predict_inference_failure() {
        let mut oracle = FailingOracle;
        let mut predictor = Predictor::new(Some(&mut oracle), Normalizer::new(Some(3)));
        assert_eq!(
            predictor.predict(&payload(3)),
            PredictionResult::Failure {
                error: "prediction failed: device lost".to_string()
            }
        );
    }

    #[test]
    fn test_predict_success() {
        let mut oracle = StaticOracle::new(vec![0.0, 0.0, 4.0]);
        let mut predictor = Predictor::new(Some(&mut oracle), Normalizer::new(Some(3)));
        match predictor.predict(&payload(3)) {
            PredictionResult::Success(p) => {
                assert_eq!(p.prediction_class, 2);
                assert_eq!(p.probabilities.len(), 3);
                assert!(p.confidence > 0.9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_prediction_result_serialization() {
        let success = PredictionResult::Success(Prediction {
            prediction_class: 1,
            probabilities: vec![0.25, 0.5, 0.25],
            confidence: 0.5,
        });
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({"prediction_class": 1, "probabilities": [0.25, 0.5, 0.25], "confidence": 0.5})
        );

        let failure = PredictionResult::Failure {
            error: "model not loaded".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"error": "model not loaded"})
        );
    }
}
