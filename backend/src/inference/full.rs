use std::path::Path;
use tract_onnx::prelude::*;

use super::{Classifier, InferenceError, ModelFormat, PredictionVector};
use crate::preprocess::{INPUT_SHAPE, InputTensor};

/// Full-precision ONNX classifier, optimised once at load time.
pub struct FullPrecisionModel {
    plan: TypedRunnableModel<TypedModel>,
}

impl FullPrecisionModel {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(INPUT_SHAPE).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::load(ModelFormat::Full, path, e))?;
        log::info!("Full-precision model ready: {}", path.display());
        Ok(Self { plan })
    }

    pub fn from_typed(model: TypedModel) -> Result<Self, InferenceError> {
        let plan = model
            .into_optimized()
            .and_then(|model| model.into_runnable())
            .map_err(InferenceError::model)?;
        Ok(Self { plan })
    }
}

impl Classifier for FullPrecisionModel {
    fn format(&self) -> ModelFormat {
        ModelFormat::Full
    }

    fn predict(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError> {
        let outputs = self
            .plan
            .run(super::to_tract_inputs(input)?)
            .map_err(InferenceError::model)?;
        super::scores_from_outputs(&outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::corner_pixel_model;
    use image::{DynamicImage, Rgb, RgbImage};

    use crate::preprocess::Preprocessor;

    fn solid(color: [u8; 3]) -> InputTensor {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb(color)));
        Preprocessor::new().process_image(&image)
    }

    #[test]
    fn predict_returns_one_score_per_class() {
        let model = FullPrecisionModel::from_typed(corner_pixel_model()).unwrap();
        let prediction = model.predict(&solid([255, 0, 0])).unwrap();

        assert_eq!(prediction.scores(), &[1.0, 0.0]);
        assert_eq!(prediction.argmax(), Some((0, 1.0)));
    }

    #[test]
    fn predictions_follow_the_input() {
        let model = FullPrecisionModel::from_typed(corner_pixel_model()).unwrap();
        let prediction = model.predict(&solid([0, 204, 0])).unwrap();

        assert_eq!(prediction.argmax().map(|(index, _)| index), Some(1));
        assert_eq!(model.format(), ModelFormat::Full);
    }
}
