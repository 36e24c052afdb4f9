use std::path::Path;
use std::sync::Mutex;
use tract_onnx::prelude::*;

use super::{Classifier, InferenceError, ModelFormat, PredictionVector};
use crate::preprocess::InputTensor;

/// Interpreter over the compact NNEF archive with one input slot and one
/// output slot: `set_input`, then `invoke`, then `output`.
///
/// Slots hold owned tensors so the interpreter stays `Send` behind a mutex.
pub struct CompactInterpreter {
    plan: TypedRunnableModel<TypedModel>,
    input: Option<TVec<Tensor>>,
    output: Option<TVec<Tensor>>,
}

impl CompactInterpreter {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let model = tract_nnef::nnef()
            .with_tract_core()
            .model_for_path(path)
            .map_err(|e| InferenceError::load(ModelFormat::Compact, path, e))?;
        Self::from_typed(model)
    }

    pub fn from_typed(model: TypedModel) -> Result<Self, InferenceError> {
        let plan = model
            .into_optimized()
            .and_then(|model| model.into_runnable())
            .map_err(InferenceError::model)?;
        Ok(Self {
            plan,
            input: None,
            output: None,
        })
    }

    pub fn set_input(&mut self, input: &InputTensor) -> Result<(), InferenceError> {
        let inputs = super::to_tract_inputs(input)?;
        self.input = Some(inputs.into_iter().map(TValue::into_tensor).collect());
        self.output = None;
        Ok(())
    }

    /// Runs the model on the input slot, consuming it.
    pub fn invoke(&mut self) -> Result<(), InferenceError> {
        let input = self.input.take().ok_or(InferenceError::MissingInput)?;
        let outputs = self
            .plan
            .run(input.into_iter().map(TValue::from).collect())
            .map_err(InferenceError::model)?;
        self.output = Some(outputs.into_iter().map(TValue::into_tensor).collect());
        Ok(())
    }

    pub fn output(&self) -> Result<PredictionVector, InferenceError> {
        let outputs = self.output.as_ref().ok_or(InferenceError::MissingOutput)?;
        let first = outputs.first().ok_or(InferenceError::EmptyOutput)?;
        super::scores_from_tensor(first)
    }
}

/// [`CompactInterpreter`] shared between request handlers.
pub struct CompactModel {
    interpreter: Mutex<CompactInterpreter>,
}

impl CompactModel {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let interpreter = CompactInterpreter::load(path)?;
        log::info!("Compact model ready: {}", path.display());
        Ok(Self::new(interpreter))
    }

    pub fn new(interpreter: CompactInterpreter) -> Self {
        Self {
            interpreter: Mutex::new(interpreter),
        }
    }
}

impl Classifier for CompactModel {
    fn format(&self) -> ModelFormat {
        ModelFormat::Compact
    }

    fn predict(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError> {
        let mut interpreter = self
            .interpreter
            .lock()
            .map_err(|_| InferenceError::Poisoned)?;
        interpreter.set_input(input)?;
        interpreter.invoke()?;
        interpreter.output()
    }
}
