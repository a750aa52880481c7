use std::sync::Arc;

use super::error::ClassifierError;
use super::model::ModelHandle;
use super::predict::{predict, Prediction};
use super::preprocess::{preprocess, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use super::scan::ScanImage;
use super::ClassifierInfo;
use crate::labels::Diagnosis;

/// A thread-safe scan classifier that chains preprocessing and inference over a
/// shared model handle.
///
/// # Thread Safety
///
/// The model handle is an `Arc<dyn InferenceModel>` and `InferenceModel`
/// requires `Send + Sync`, so a `Classifier` can be wrapped in `Arc` and
/// shared across request handlers.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use lungscan::{Classifier, ModelLoader, RuntimeConfig, ScanImage};
///
/// let loader = ModelLoader::new("covid19_cnn_model.onnx", RuntimeConfig::default());
/// let classifier = Classifier::new(loader.load()?);
///
/// let prediction = classifier.classify(&ScanImage::open("scan.png")?)?;
/// println!("{} ({:.2}%)", prediction.label, prediction.confidence);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    model: ModelHandle,
    input_width: u32,
    input_height: u32,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a classifier for the default 224x224 input.
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            input_width: DEFAULT_WIDTH,
            input_height: DEFAULT_HEIGHT,
        }
    }

    /// Overrides the size scans are resized to before inference.
    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_width = width;
        self.input_height = height;
        self
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Returns information about the classifier's configuration
    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            input_width: self.input_width,
            input_height: self.input_height,
            model_input_shape: self.model.input_shape().to_vec(),
            num_classes: Diagnosis::ALL.len(),
            class_labels: Diagnosis::labels().iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Preprocesses a decoded scan and runs the model on it.
    pub fn classify(&self, image: &ScanImage) -> Result<Prediction, ClassifierError> {
        let tensor = preprocess(image, self.input_width, self.input_height)?;
        predict(&tensor, Arc::as_ref(&self.model))
    }

    /// Decodes uploaded bytes and classifies them, returning the decoded image
    /// alongside the prediction so callers can show its metadata.
    pub fn classify_upload(
        &self,
        bytes: &[u8],
        file_name: Option<&str>,
    ) -> Result<(ScanImage, Prediction), ClassifierError> {
        let image = ScanImage::decode_upload(bytes, file_name)?;
        let prediction = self.classify(&image)?;
        Ok((image, prediction))
    }
}
