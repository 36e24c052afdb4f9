use shared::{Diagnosis, DiagnosisReport};
use strum::EnumCount;

use crate::inference::PredictionVector;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MappingError {
    #[error("Model produced {actual} class scores (top class {top_class}), expected {expected}")]
    ClassCountMismatch {
        expected: usize,
        actual: usize,
        top_class: usize,
    },
    #[error("Prediction contains no comparable scores")]
    NoScores,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisResult {
    pub diagnosis: Diagnosis,
    pub class_index: usize,
    pub confidence: f32,
    pub scores: Vec<f32>,
}

impl DiagnosisResult {
    pub fn label(&self) -> &'static str {
        self.diagnosis.label()
    }

    pub fn treatment(&self) -> &'static str {
        self.diagnosis.treatment()
    }

    pub fn to_report(&self) -> DiagnosisReport {
        DiagnosisReport {
            diagnosis: self.diagnosis,
            class_index: self.class_index,
            label: self.label().to_string(),
            treatment: self.treatment().to_string(),
            confidence: self.confidence,
            scores: self.scores.clone(),
        }
    }
}

/// Maps a prediction to its diagnosis. The score vector must be exactly as
/// wide as the set of trained diagnoses.
pub fn map_prediction(prediction: &PredictionVector) -> Result<DiagnosisResult, MappingError> {
    let (class_index, confidence) = prediction.argmax().ok_or(MappingError::NoScores)?;
    if prediction.len() != Diagnosis::COUNT {
        return Err(MappingError::ClassCountMismatch {
            expected: Diagnosis::COUNT,
            actual: prediction.len(),
            top_class: class_index,
        });
    }
    Ok(DiagnosisResult {
        diagnosis: Diagnosis::from_class_index(class_index),
        class_index,
        confidence,
        scores: prediction.scores().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_when_first_class_wins() {
        let result = map_prediction(&PredictionVector::new(vec![0.91, 0.09])).unwrap();
        assert_eq!(result.diagnosis, Diagnosis::Healthy);
        assert_eq!(result.label(), "Healthy Cow");
        assert_eq!(
            result.treatment(),
            "No treatment needed. Keep providing proper diet and clean environment."
        );
        assert_eq!(result.confidence, 0.91);
    }

    #[test]
    fn lumpy_when_second_class_wins() {
        let result = map_prediction(&PredictionVector::new(vec![0.2, 0.8])).unwrap();
        assert_eq!(result.class_index, 1);
        assert_eq!(result.label(), "Lumpy Disease Detected");
        assert_eq!(
            result.treatment(),
            "Isolate the infected cow. Contact a veterinarian for antiviral treatment and maintain hygiene."
        );
    }

    #[test]
    fn five_class_head_is_rejected_instead_of_mislabelled() {
        let prediction = PredictionVector::new(vec![0.1, 0.1, 0.1, 0.6, 0.1]);
        let err = map_prediction(&prediction).unwrap_err();
        assert_eq!(
            err,
            MappingError::ClassCountMismatch {
                expected: 2,
                actual: 5,
                top_class: 3
            }
        );
        assert_eq!(
            err.to_string(),
            "Model produced 5 class scores (top class 3), expected 2"
        );
    }

    #[test]
    fn all_nan_scores_are_rejected() {
        let prediction = PredictionVector::new(vec![f32::NAN, f32::NAN]);
        assert_eq!(map_prediction(&prediction), Err(MappingError::NoScores));
    }

    #[test]
    fn report_carries_label_and_scores() {
        let report = map_prediction(&PredictionVector::new(vec![0.3, 0.7]))
            .unwrap()
            .to_report();
        assert_eq!(report.diagnosis, Diagnosis::LumpySkin);
        assert_eq!(report.label, "Lumpy Disease Detected");
        assert_eq!(report.scores, vec![0.3, 0.7]);
    }
}
