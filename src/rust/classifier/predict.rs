use log::{error, info};
use serde::Serialize;

use super::error::ClassifierError;
use super::model::InferenceModel;
use super::preprocess::InputTensor;
use crate::labels::{Diagnosis, NUM_CLASSES};

/// Allowed deviation of the probability sum from 1.0.
pub const PROBABILITY_TOLERANCE: f32 = 1e-3;

/// Outcome of classifying one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Class at the first-occurrence argmax of `probabilities`
    pub label: Diagnosis,
    /// `100 * max(probabilities)`
    pub confidence: f32,
    /// Per-class probabilities in label order
    pub probabilities: [f32; NUM_CLASSES],
}

impl Prediction {
    /// Builds a prediction from a validated probability vector.
    ///
    /// # Errors
    /// - `PredictionError` if the vector has the wrong length, contains
    ///   negative or non-finite values, or does not sum to 1.0 within
    ///   [`PROBABILITY_TOLERANCE`]
    pub fn from_probabilities(values: &[f32]) -> Result<Self, ClassifierError> {
        let probabilities: [f32; NUM_CLASSES] = values.try_into().map_err(|_| {
            ClassifierError::PredictionError(format!(
                "Model returned {} values, expected {}",
                values.len(),
                NUM_CLASSES
            ))
        })?;

        if let Some(bad) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(ClassifierError::PredictionError(format!(
                "Invalid probability {} in {:?}",
                bad, probabilities
            )));
        }
        let sum: f32 = probabilities.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ClassifierError::PredictionError(format!(
                "Probabilities sum to {}, expected 1.0",
                sum
            )));
        }

        let index = argmax(&probabilities);
        let label = Diagnosis::from_index(index).ok_or_else(|| {
            ClassifierError::PredictionError(format!("No label for class index {}", index))
        })?;

        Ok(Self {
            label,
            confidence: probabilities[index] * 100.0,
            probabilities,
        })
    }

    /// Probability of each class, paired with its label, in label order.
    pub fn scores(&self) -> impl Iterator<Item = (Diagnosis, f32)> + '_ {
        Diagnosis::ALL.iter().copied().zip(self.probabilities.iter().copied())
    }
}

/// Index of the largest value. Ties resolve to the lowest index.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value > values[best] {
            best = i;
        }
    }
    best
}

/// Checks the tensor against the model's declared input shape.
pub(crate) fn check_shape(expected: &[i64], actual: &[usize]) -> Result<(), ClassifierError> {
    let matches = expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(&e, &a)| e < 0 || e as usize == a);
    if matches {
        Ok(())
    } else {
        Err(ClassifierError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

/// Runs one forward pass and turns the output into a [`Prediction`].
///
/// # Errors
/// - `ShapeMismatch` if the tensor does not fit the model input
/// - `ModelError` if the forward pass fails
/// - `PredictionError` if the output is not a valid probability vector
pub fn predict(tensor: &InputTensor, model: &dyn InferenceModel) -> Result<Prediction, ClassifierError> {
    if let Err(e) = check_shape(model.input_shape(), tensor.shape()) {
        error!("Preprocessed tensor does not fit the model: {}", e);
        return Err(e);
    }

    let output = model.forward(tensor)?;
    let prediction = Prediction::from_probabilities(&output)?;

    info!(
        "Predicted '{}' with {:.2}% confidence ({:?})",
        prediction.label, prediction.confidence, prediction.probabilities
    );
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[derive(Debug)]
    struct FixedModel {
        shape: Vec<i64>,
        output: Vec<f32>,
    }

    impl FixedModel {
        fn new(output: Vec<f32>) -> Self {
            Self { shape: vec![-1, 224, 224, 3], output }
        }
    }

    impl InferenceModel for FixedModel {
        fn input_shape(&self) -> &[i64] {
            &self.shape
        }

        fn forward(&self, _input: &InputTensor) -> Result<Vec<f32>, ClassifierError> {
            Ok(self.output.clone())
        }
    }

    fn tensor(height: usize, width: usize) -> InputTensor {
        InputTensor::from_array(Array4::zeros((1, height, width, 3))).unwrap()
    }

    #[test]
    fn test_label_matches_argmax() {
        let cases = [
            ([0.7, 0.2, 0.1], Diagnosis::Covid19Positive),
            ([0.1, 0.8, 0.1], Diagnosis::Normal),
            ([0.05, 0.15, 0.8], Diagnosis::ViralPneumonia),
        ];
        for (probs, expected) in cases {
            let model = FixedModel::new(probs.to_vec());
            let prediction = predict(&tensor(224, 224), &model).unwrap();
            assert_eq!(prediction.label, expected);
            assert_eq!(prediction.probabilities, probs);
            let max = probs.iter().cloned().fold(f32::MIN, f32::max);
            assert!((prediction.confidence - max * 100.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_tie_break_lowest_index() {
        let model = FixedModel::new(vec![0.4, 0.4, 0.2]);
        let prediction = predict(&tensor(224, 224), &model).unwrap();
        assert_eq!(prediction.label, Diagnosis::Covid19Positive);
        assert_eq!(prediction.label.label(), "COVID-19 Positive");

        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[1.0 / 3.0; 3]), 0);
    }

    #[test]
    fn test_shape_mismatch() {
        let model = FixedModel::new(vec![0.2, 0.3, 0.5]);
        let result = predict(&tensor(128, 128), &model);
        assert!(matches!(result, Err(ClassifierError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_dynamic_dimensions_accept_any_size() {
        let model = FixedModel {
            shape: vec![-1, -1, -1, 3],
            output: vec![0.2, 0.3, 0.5],
        };
        assert!(predict(&tensor(97, 33), &model).is_ok());
    }

    #[test]
    fn test_wrong_output_length() {
        let model = FixedModel::new(vec![0.5, 0.5]);
        assert!(matches!(
            predict(&tensor(224, 224), &model),
            Err(ClassifierError::PredictionError(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_probabilities() {
        assert!(Prediction::from_probabilities(&[0.9, 0.9, 0.1]).is_err());
        assert!(Prediction::from_probabilities(&[1.2, -0.1, -0.1]).is_err());
        assert!(Prediction::from_probabilities(&[f32::NAN, 0.5, 0.5]).is_err());
        assert!(Prediction::from_probabilities(&[0.3333, 0.3333, 0.3334]).is_ok());
    }

    #[test]
    fn test_scores_in_label_order() {
        let prediction = Prediction::from_probabilities(&[0.1, 0.6, 0.3]).unwrap();
        let scores: Vec<_> = prediction.scores().collect();
        assert_eq!(scores[0], (Diagnosis::Covid19Positive, 0.1));
        assert_eq!(scores[1], (Diagnosis::Normal, 0.6));
        assert_eq!(scores[2], (Diagnosis::ViralPneumonia, 0.3));
    }

    #[test]
    fn test_serializes_label_as_text() {
        let prediction = Prediction::from_probabilities(&[0.0, 1.0, 0.0]).unwrap();
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["label"], "Normal");
        assert_eq!(json["confidence"], 100.0);
        assert_eq!(json["probabilities"].as_array().unwrap().len(), 3);
    }
}
