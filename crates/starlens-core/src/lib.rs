//! starlens-core — face-cropped identity classification.
//!
//! Locates a face with a SeetaFace cascade, crops and normalizes it, and
//! classifies it with an ONNX network via ONNX Runtime on the CPU.

pub mod classifier;
pub mod detector;
pub mod labels;
pub mod pipeline;
pub mod preprocess;
pub mod types;

pub use classifier::{Classifier, OnnxClassifier};
pub use detector::{CascadeLocator, CascadeParams, FaceLocator};
pub use labels::LabelCatalog;
pub use pipeline::{Pipeline, PipelineError};
pub use types::{FaceRegion, ImageTensor, Prediction, RankedLabel};
