use serde::Serialize;

mod classifier;
mod error;
pub mod model;
pub mod predict;
pub mod preprocess;
pub mod scan;

pub use classifier::Classifier;
pub use error::ClassifierError;
pub use model::{InferenceModel, ModelHandle, OnnxModel};
pub use predict::{argmax, predict, Prediction};
pub use preprocess::{preprocess, InputTensor};
pub use scan::{ColorMode, ImageMetadata, ScanImage};

/// Information about the classifier's input contract and label set
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierInfo {
    /// Width scans are resized to
    pub input_width: u32,
    /// Height scans are resized to
    pub input_height: u32,
    /// Input shape declared by the model (`-1` for dynamic dimensions)
    pub model_input_shape: Vec<i64>,
    /// Number of output classes
    pub num_classes: usize,
    /// Labels in model output order
    pub class_labels: Vec<String>,
}
