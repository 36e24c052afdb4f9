use serde::{Deserialize, Serialize};
use strum::EnumCount;
use strum_macros::EnumIter;

/// Diagnoses the classifier was trained on, in training-time label order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumCount, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    Healthy = 0,
    LumpySkin = 1,
}

// One (label, treatment) row per trained class, indexed by discriminant.
const RESULT_TABLE: [(&str, &str); Diagnosis::COUNT] = [
    (
        "Healthy Cow",
        "No treatment needed. Keep providing proper diet and clean environment.",
    ),
    (
        "Lumpy Disease Detected",
        "Isolate the infected cow. Contact a veterinarian for antiviral treatment and maintain hygiene.",
    ),
];

impl Diagnosis {
    /// Maps an argmax index to a diagnosis. Index 0 is healthy; every other
    /// index falls back to the disease diagnosis.
    pub fn from_class_index(index: usize) -> Self {
        match index {
            0 => Diagnosis::Healthy,
            _ => Diagnosis::LumpySkin,
        }
    }

    pub fn class_index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        RESULT_TABLE[self.class_index()].0
    }

    pub fn treatment(self) -> &'static str {
        RESULT_TABLE[self.class_index()].1
    }

    pub fn is_healthy(self) -> bool {
        self == Diagnosis::Healthy
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiagnosisReport {
    pub diagnosis: Diagnosis,
    pub class_index: usize,
    pub label: String,
    pub treatment: String,
    pub confidence: f32,
    pub scores: Vec<f32>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub model_format: String,
    pub classes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn index_zero_is_healthy() {
        assert_eq!(Diagnosis::from_class_index(0), Diagnosis::Healthy);
        assert_eq!(Diagnosis::Healthy.label(), "Healthy Cow");
        assert!(Diagnosis::Healthy.treatment().starts_with("No treatment needed"));
    }

    #[test]
    fn non_zero_indices_fall_back_to_disease() {
        for index in [1, 2, 4, 17] {
            assert_eq!(Diagnosis::from_class_index(index), Diagnosis::LumpySkin);
        }
        assert_eq!(Diagnosis::LumpySkin.label(), "Lumpy Disease Detected");
        assert!(Diagnosis::LumpySkin.treatment().starts_with("Isolate the infected cow."));
    }

    #[test]
    fn discriminants_follow_training_order() {
        let indices: Vec<usize> = Diagnosis::iter().map(Diagnosis::class_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(Diagnosis::COUNT, 2);
    }
}
