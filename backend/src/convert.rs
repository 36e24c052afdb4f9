//! Offline conversion of the full-precision ONNX model into the compact NNEF
//! archive served by [`crate::inference::CompactModel`].

use std::fs::File;
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

use crate::inference::{Classifier, InferenceError};
use crate::preprocess::{INPUT_SHAPE, InputTensor};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("Round-trip check failed: {0}")]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    pub output: PathBuf,
    pub nodes: usize,
    pub bytes: u64,
}

pub fn convert_to_compact(input: &Path, output: &Path) -> Result<ConversionSummary, ConvertError> {
    let load_err = |e: TractError| ConvertError::Load {
        path: input.to_path_buf(),
        message: format!("{e:#}"),
    };
    let model = tract_onnx::onnx()
        .model_for_path(input)
        .and_then(|model| model.with_input_fact(0, f32::fact(INPUT_SHAPE).into()))
        .and_then(|model| model.into_typed())
        .and_then(|model| model.into_decluttered())
        .map_err(load_err)?;
    log::info!(
        "Loaded {} ({} nodes after decluttering)",
        input.display(),
        model.nodes().len()
    );
    write_compact(&model, output)
}

pub fn write_compact(model: &TypedModel, output: &Path) -> Result<ConversionSummary, ConvertError> {
    let write_err = |message: String| ConvertError::Write {
        path: output.to_path_buf(),
        message,
    };
    let file = File::create(output).map_err(|e| write_err(e.to_string()))?;
    tract_nnef::nnef()
        .with_tract_core()
        .write_to_tar(model, file)
        .map_err(|e| write_err(format!("{e:#}")))?;
    let bytes = std::fs::metadata(output)
        .map_err(|e| write_err(e.to_string()))?
        .len();
    log::info!("Compact model saved to {} ({} bytes)", output.display(), bytes);

    Ok(ConversionSummary {
        output: output.to_path_buf(),
        nodes: model.nodes().len(),
        bytes,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundTripReport {
    pub compared: usize,
    /// Indices of inputs where the two backends picked different classes.
    pub disagreements: Vec<usize>,
    pub max_abs_diff: f32,
}

impl RoundTripReport {
    pub fn is_consistent(&self) -> bool {
        self.disagreements.is_empty()
    }
}

/// Runs both models on every input and compares the argmax of their outputs.
pub fn verify_round_trip(
    reference: &dyn Classifier,
    candidate: &dyn Classifier,
    inputs: &[InputTensor],
) -> Result<RoundTripReport, ConvertError> {
    let mut disagreements = Vec::new();
    let mut max_abs_diff = 0.0f32;

    for (index, input) in inputs.iter().enumerate() {
        let expected = reference.predict(input)?;
        let actual = candidate.predict(input)?;

        if expected.argmax().map(|(class, _)| class) != actual.argmax().map(|(class, _)| class) {
            disagreements.push(index);
        }
        for (a, b) in expected.scores().iter().zip(actual.scores()) {
            max_abs_diff = max_abs_diff.max((a - b).abs());
        }
    }

    Ok(RoundTripReport {
        compared: inputs.len(),
        disagreements,
        max_abs_diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::corner_pixel_model;
    use crate::inference::{
        CompactInterpreter, CompactModel, FullPrecisionModel, ModelFormat, PredictionVector,
    };
    use crate::preprocess::Preprocessor;
    use image::{DynamicImage, Rgb, RgbImage};

    fn reference_images() -> Vec<InputTensor> {
        [[250, 5, 5], [5, 250, 5], [120, 90, 30], [30, 90, 120]]
            .into_iter()
            .map(|color| {
                let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb(color)));
                Preprocessor::new().process_image(&image)
            })
            .collect()
    }

    #[test]
    fn compact_archive_agrees_with_full_model() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("cattle_model.nnef.tar");

        let summary = write_compact(&corner_pixel_model(), &archive).unwrap();
        assert!(summary.bytes > 0);
        assert_eq!(ModelFormat::from_path(&summary.output), Some(ModelFormat::Compact));

        let full = FullPrecisionModel::from_typed(corner_pixel_model()).unwrap();
        let compact = CompactModel::new(CompactInterpreter::load(&archive).unwrap());

        let report = verify_round_trip(&full, &compact, &reference_images()).unwrap();
        assert_eq!(report.compared, 4);
        assert!(report.is_consistent(), "{report:?}");
        assert!(report.max_abs_diff < 1e-6);
    }

    struct Constant(Vec<f32>);

    impl Classifier for Constant {
        fn format(&self) -> ModelFormat {
            ModelFormat::Full
        }

        fn predict(&self, _input: &InputTensor) -> Result<PredictionVector, InferenceError> {
            Ok(PredictionVector::new(self.0.clone()))
        }
    }

    #[test]
    fn flipped_diagnosis_is_reported() {
        let inputs = reference_images();
        let report = verify_round_trip(
            &Constant(vec![0.9, 0.1]),
            &Constant(vec![0.4, 0.6]),
            &inputs[..2],
        )
        .unwrap();

        assert_eq!(report.disagreements, vec![0, 1]);
        assert!(!report.is_consistent());
        assert!((report.max_abs_diff - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_onnx_input_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert_to_compact(Path::new("nope.onnx"), &dir.path().join("out.nnef.tar"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::Load { .. }));
    }
}
