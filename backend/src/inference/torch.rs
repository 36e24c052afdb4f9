use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::{Classifier, InferenceError, ModelFormat, PredictionVector};
use crate::preprocess::InputTensor;
use crate::repair::ScaffoldModel;

/// TorchScript classifier fed the same NHWC tensor as the tract backends.
pub struct TorchScriptModel {
    module: Mutex<CModule>,
    device: Device,
}

impl TorchScriptModel {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(path, device).map_err(|e| InferenceError::Load {
            format: ModelFormat::TorchScript,
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        log::info!("TorchScript model ready on {:?}: {}", device, path.display());
        Ok(Self {
            module: Mutex::new(module),
            device,
        })
    }
}

pub(crate) fn input_to_tensor(input: &InputTensor, device: Device) -> Tensor {
    let shape: Vec<i64> = input.shape().iter().map(|&dim| dim as i64).collect();
    Tensor::from_slice(&input.to_vec())
        .reshape(shape.as_slice())
        .to_device(device)
}

pub(crate) fn tensor_to_scores(output: &Tensor) -> PredictionVector {
    let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
    let num_elements = output_flat.numel();
    let mut scores = vec![0.0f32; num_elements];
    output_flat.copy_data(&mut scores, num_elements);
    PredictionVector::new(scores)
}

impl Classifier for TorchScriptModel {
    fn format(&self) -> ModelFormat {
        ModelFormat::TorchScript
    }

    fn predict(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError> {
        let tensor = input_to_tensor(input, self.device);
        let output = {
            let module = self.module.lock().map_err(|_| InferenceError::Poisoned)?;
            tch::no_grad(|| module.forward_ts(&[tensor]))?
        };
        Ok(tensor_to_scores(&output))
    }
}

/// Scaffold architecture rebuilt in code around weights saved by
/// `repair-model`.
pub struct ScaffoldClassifier {
    model: Mutex<ScaffoldModel>,
    device: Device,
}

impl ScaffoldClassifier {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = ScaffoldModel::load(path, device).map_err(|e| InferenceError::Load {
            format: ModelFormat::Scaffold,
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        log::info!("Scaffold model ready on {:?}: {}", device, path.display());
        Ok(Self {
            model: Mutex::new(model),
            device,
        })
    }
}

impl Classifier for ScaffoldClassifier {
    fn format(&self) -> ModelFormat {
        ModelFormat::Scaffold
    }

    fn predict(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError> {
        let tensor = input_to_tensor(input, self.device);
        let output = {
            let model = self.model.lock().map_err(|_| InferenceError::Poisoned)?;
            model.predict(&tensor)
        };
        Ok(tensor_to_scores(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use crate::preprocess::INPUT_SHAPE;

    #[test]
    fn tensor_conversion_keeps_nhwc_layout() {
        let mut array = Array4::<f32>::zeros(INPUT_SHAPE);
        array[[0, 3, 7, 2]] = 0.5;
        let input = InputTensor::from_array(array).unwrap();

        let tensor = input_to_tensor(&input, Device::Cpu);
        assert_eq!(tensor.size(), vec![1, 224, 224, 3]);
        assert_eq!(tensor.double_value(&[0, 3, 7, 2]), 0.5);
    }

    #[test]
    fn scores_are_flattened() {
        let output = Tensor::from_slice(&[0.25f32, 0.75]).reshape([1, 2]);
        assert_eq!(tensor_to_scores(&output).scores(), &[0.25, 0.75]);
    }

    #[test]
    fn missing_module_fails_to_load() {
        let err = TorchScriptModel::load(Path::new("missing.pt")).err().unwrap();
        assert!(matches!(err, InferenceError::Load { .. }));
    }

    #[test]
    fn missing_scaffold_weights_fail_to_load() {
        let err = ScaffoldClassifier::load(Path::new("missing.ot")).err().unwrap();
        assert!(matches!(err, InferenceError::Load { format: ModelFormat::Scaffold, .. }));
    }
}
