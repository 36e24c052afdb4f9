//! Recovery for model files that libtorch cannot load as a full module.
//!
//! The fallback rebuilds the scaffold architecture in code and loads only
//! its weights. If that fails too, repair stops with an error; it never
//! writes out a model with freshly initialised weights.

use std::path::{Path, PathBuf};
use tch::nn::{self, ModuleT};
use tch::{CModule, Device, Kind, TchError, Tensor};

use crate::inference::ModelFormat;

/// Width of the pooled backbone feature fed to the head.
pub const SCAFFOLD_FEATURES: i64 = 256;
/// Class count of the scaffold head. Runtime inference uses two classes, so
/// a repaired scaffold does not fit the diagnosis mapper as-is.
pub const SCAFFOLD_CLASSES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    LoadedDirectly,
    RebuiltFromWeights,
}

impl RepairOutcome {
    /// Format to serve the repaired file with.
    pub fn model_format(self) -> ModelFormat {
        match self {
            RepairOutcome::LoadedDirectly => ModelFormat::TorchScript,
            RepairOutcome::RebuiltFromWeights => ModelFormat::Scaffold,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error(
        "Could not load {path} as a full model ({model_error}) or as scaffold weights ({weights_error})"
    )]
    WeightsUnloadable {
        path: PathBuf,
        model_error: String,
        weights_error: String,
    },
    #[error("Failed to save repaired model to {path}: {message}")]
    Save { path: PathBuf, message: String },
}

/// EfficientNet-B4 backbone, ReLU, dense head, softmax. Takes NHWC input.
pub struct ScaffoldModel {
    vs: nn::VarStore,
    net: nn::SequentialT,
}

impl ScaffoldModel {
    pub fn new(device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let net = scaffold_net(&vs.root());
        Self { vs, net }
    }

    pub fn load(path: &Path, device: Device) -> Result<Self, TchError> {
        let mut model = Self::new(device);
        model.load_weights(path)?;
        Ok(model)
    }

    pub fn load_weights(&mut self, path: &Path) -> Result<(), TchError> {
        self.vs.load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), TchError> {
        self.vs.save(path)
    }

    pub fn predict(&self, images: &Tensor) -> Tensor {
        tch::no_grad(|| self.net.forward_t(&images.to_device(self.vs.device()), false))
    }
}

fn scaffold_net(p: &nn::Path) -> nn::SequentialT {
    nn::seq_t()
        .add_fn(|xs| xs.permute([0, 3, 1, 2]))
        .add(tch::vision::efficientnet::b4(&(p / "backbone"), SCAFFOLD_FEATURES))
        .add_fn(|xs| xs.relu())
        .add(nn::linear(
            p / "head",
            SCAFFOLD_FEATURES,
            SCAFFOLD_CLASSES,
            Default::default(),
        ))
        .add_fn(|xs| xs.softmax(-1, Kind::Float))
}

pub fn repair_model(input: &Path, output: &Path) -> Result<RepairOutcome, RepairError> {
    let save_err = |message: String| RepairError::Save {
        path: output.to_path_buf(),
        message,
    };

    log::info!("Loading model from {}", input.display());
    let model_error = match CModule::load(input) {
        Ok(_) => {
            log::info!("Model loaded normally");
            if input != output {
                std::fs::copy(input, output).map_err(|e| save_err(e.to_string()))?;
            }
            return Ok(RepairOutcome::LoadedDirectly);
        }
        Err(e) => e.to_string(),
    };

    log::warn!("Model could not be loaded directly, rebuilding scaffold: {}", model_error);
    let mut scaffold = ScaffoldModel::new(Device::Cpu);
    if let Err(e) = scaffold.load_weights(input) {
        log::error!("Could not load scaffold weights from {}: {}", input.display(), e);
        return Err(RepairError::WeightsUnloadable {
            path: input.to_path_buf(),
            model_error,
            weights_error: e.to_string(),
        });
    }
    log::info!("Scaffold weights loaded");

    scaffold.save(output).map_err(|e| save_err(e.to_string()))?;
    log::info!("Repaired model saved to {}", output.display());
    Ok(RepairOutcome::RebuiltFromWeights)
}
