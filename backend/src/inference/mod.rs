mod compact;
mod full;
#[cfg(feature = "torch")]
pub(crate) mod torch;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tract_onnx::prelude::{Tensor, TractError, TValue, TVec, tvec};

use crate::preprocess::InputTensor;

pub use compact::{CompactInterpreter, CompactModel};
pub use full::FullPrecisionModel;
#[cfg(feature = "torch")]
pub use torch::{ScaffoldClassifier, TorchScriptModel};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load {format} model from {path}: {message}")]
    Load {
        format: ModelFormat,
        path: PathBuf,
        message: String,
    },
    #[error("Model execution failed: {0}")]
    Model(String),
    #[error("Model produced no output tensor")]
    EmptyOutput,
    #[error("Interpreter invoked before an input was set")]
    MissingInput,
    #[error("Interpreter output read before invoke")]
    MissingOutput,
    #[error("Model lock poisoned")]
    Poisoned,
    #[error("{0} models need the `torch` feature")]
    Unsupported(ModelFormat),
    #[cfg(feature = "torch")]
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),
}

impl InferenceError {
    fn load(format: ModelFormat, path: &Path, err: TractError) -> Self {
        InferenceError::Load {
            format,
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        }
    }

    fn model(err: TractError) -> Self {
        InferenceError::Model(format!("{err:#}"))
    }
}

/// Physical model artifact formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Full-precision ONNX graph.
    Full,
    /// NNEF tar archive produced by `convert-model`.
    Compact,
    /// TorchScript module, loaded through libtorch.
    TorchScript,
    /// Scaffold weights written by `repair-model`.
    Scaffold,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".onnx") {
            Some(ModelFormat::Full)
        } else if name.ends_with(".nnef.tar") || name.ends_with(".nnef.tgz") || name.ends_with(".tar") {
            Some(ModelFormat::Compact)
        } else if name.ends_with(".pt") || name.ends_with(".pth") {
            Some(ModelFormat::TorchScript)
        } else if name.ends_with(".ot") {
            Some(ModelFormat::Scaffold)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFormat::Full => "full",
            ModelFormat::Compact => "compact",
            ModelFormat::TorchScript => "torchscript",
            ModelFormat::Scaffold => "scaffold",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "onnx" => Ok(ModelFormat::Full),
            "compact" | "nnef" => Ok(ModelFormat::Compact),
            "torchscript" | "torch" => Ok(ModelFormat::TorchScript),
            "scaffold" | "weights" => Ok(ModelFormat::Scaffold),
            other => Err(format!("unknown model format: {other}")),
        }
    }
}

/// Per-class scores for a single image.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionVector(Vec<f32>);

impl PredictionVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    pub fn scores(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index and value of the highest score. NaN entries are skipped and
    /// ties resolve to the lowest index. A NaN never wins, even in first
    /// position; an all-NaN vector has no argmax.
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, &score) in self.0.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((index, score)),
            }
        }
        best
    }

}

/// A loaded model that turns one preprocessed image into class scores.
pub trait Classifier: Send + Sync {
    fn format(&self) -> ModelFormat;

    fn predict(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError>;
}

pub fn load_classifier(
    path: &Path,
    format: ModelFormat,
) -> Result<Arc<dyn Classifier>, InferenceError> {
    log::info!("Loading {} model from {}", format, path.display());
    match format {
        ModelFormat::Full => Ok(Arc::new(FullPrecisionModel::load(path)?)),
        ModelFormat::Compact => Ok(Arc::new(CompactModel::load(path)?)),
        #[cfg(feature = "torch")]
        ModelFormat::TorchScript => Ok(Arc::new(TorchScriptModel::load(path)?)),
        #[cfg(feature = "torch")]
        ModelFormat::Scaffold => Ok(Arc::new(ScaffoldClassifier::load(path)?)),
        #[cfg(not(feature = "torch"))]
        ModelFormat::TorchScript | ModelFormat::Scaffold => {
            Err(InferenceError::Unsupported(format))
        }
    }
}

fn to_tract_inputs(input: &InputTensor) -> Result<TVec<TValue>, InferenceError> {
    let tensor = Tensor::from_shape(input.shape(), &input.to_vec()).map_err(InferenceError::model)?;
    Ok(tvec!(tensor.into()))
}

fn scores_from_outputs(outputs: &[TValue]) -> Result<PredictionVector, InferenceError> {
    let output = outputs.first().ok_or(InferenceError::EmptyOutput)?;
    scores_from_tensor(output)
}

fn scores_from_tensor(output: &Tensor) -> Result<PredictionVector, InferenceError> {
    let view = output
        .to_array_view::<f32>()
        .map_err(InferenceError::model)?;
    let prediction = PredictionVector::new(view.iter().copied().collect());
    if prediction.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }
    Ok(prediction)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Tiny typed graphs standing in for real classifiers.

    use tract_onnx::prelude::*;
    use tract_onnx::tract_core::ops::array::Slice;

    use crate::preprocess::INPUT_SHAPE;

    /// Returns the R and G values of the top-left pixel as two class scores,
    /// so the "healthy" class wins whenever red dominates.
    pub fn corner_pixel_model() -> TypedModel {
        let mut model = TypedModel::default();
        let mut wire = model
            .add_source("input", f32::fact(INPUT_SHAPE))
            .unwrap();
        for (axis, end) in [(1, 1usize), (2, 1), (3, 2)] {
            wire = model
                .wire_node(format!("slice_{axis}"), Slice::new(axis, 0usize, end), &[wire])
                .unwrap()[0];
        }
        model.set_output_outlets(&[wire]).unwrap();
        model
    }
}
