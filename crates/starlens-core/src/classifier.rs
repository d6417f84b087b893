//! Identity classifier via ONNX Runtime.
//!
//! Runs a ResNet-18 whose final layer is sized to the label catalog and turns
//! its logits into a probability distribution.

use crate::types::{ImageTensor, INPUT_SIZE};
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use thiserror::Error;

const DEVICE_CPU: &str = "cpu";

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier model not found: {0}")]
    ModelNotFound(String),
    #[error("classifier outputs {actual} classes but the label map has {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps a normalized image tensor to class probabilities.
pub trait Classifier {
    /// Probabilities, one per class, summing to 1.
    fn infer(&mut self, input: &ImageTensor) -> Result<Vec<f32>, ClassifierError>;

    /// Output width.
    fn num_classes(&self) -> usize;

    /// Compute device identifier, e.g. `"cpu"`.
    fn device(&self) -> &str;
}

/// ONNX-exported classifier.
pub struct OnnxClassifier {
    session: Session,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Load the model and check that its output width equals `num_classes`.
    pub fn load(
        model_path: impl AsRef<Path>,
        num_classes: usize,
        intra_threads: usize,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded classifier model"
        );

        // Static output width, when the export declares one.
        let declared = session.outputs().first().and_then(|o| match o.dtype() {
            ValueType::Tensor { shape, .. } => shape.last().copied(),
            _ => None,
        });
        if let Some(width) = declared.filter(|w| *w > 0) {
            check_width(num_classes, width as usize)?;
        }

        let mut classifier = Self { session, num_classes };

        // Dynamic exports only reveal their width on a real run.
        let probe = ImageTensor::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
        let logits = classifier.forward(&probe)?;
        check_width(num_classes, logits.len())?;

        Ok(classifier)
    }

    fn forward(&mut self, input: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("logits: {e}")))?;

        Ok(logits.to_vec())
    }
}

impl Classifier for OnnxClassifier {
    fn infer(&mut self, input: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
        let logits = self.forward(input)?;
        if logits.len() != self.num_classes {
            return Err(ClassifierError::ShapeMismatch {
                expected: self.num_classes,
                actual: logits.len(),
            });
        }
        Ok(softmax(&logits))
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn device(&self) -> &str {
        DEVICE_CPU
    }
}

fn check_width(expected: usize, actual: usize) -> Result<(), ClassifierError> {
    if expected != actual {
        return Err(ClassifierError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}
