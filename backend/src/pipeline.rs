use std::sync::Arc;
use std::time::Instant;

use crate::inference::{Classifier, InferenceError, ModelFormat};
use crate::mapper::{DiagnosisResult, MappingError, map_prediction};
use crate::preprocess::{PreprocessError, Preprocessor};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Decode, preprocess, predict, map. One linear pass per image.
#[derive(Clone)]
pub struct DiagnosisPipeline {
    preprocessor: Arc<Preprocessor>,
    classifier: Arc<dyn Classifier>,
}

impl DiagnosisPipeline {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            preprocessor: Arc::new(Preprocessor::new()),
            classifier,
        }
    }

    pub fn model_format(&self) -> ModelFormat {
        self.classifier.format()
    }

    pub fn diagnose(&self, image: &[u8]) -> Result<DiagnosisResult, PipelineError> {
        let started = Instant::now();
        let tensor = self.preprocessor.process_bytes(image)?;
        let prediction = self.classifier.predict(&tensor)?;
        let result = map_prediction(&prediction)?;
        log::debug!(
            "Diagnosed {:?} (class {}, score {:.4}) in {:?}",
            result.diagnosis,
            result.class_index,
            result.confidence,
            started.elapsed()
        );
        Ok(result)
    }
}
