use ort::Error as OrtError;

/// Errors raised while turning an uploaded scan into a prediction.
///
/// Decode and image-mode errors are request-scoped: the caller rejects the
/// input and asks for another upload. Shape and model errors indicate a broken
/// invariant between the preprocessor and the loaded model.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The bytes could not be decoded as an image
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    /// The declared file extension is not one of the accepted upload types
    #[error("Unsupported file type: {0} (expected png, jpg or jpeg)")]
    UnsupportedFormat(String),
    /// The decoded image cannot be converted to 3-channel RGB
    #[error("Unsupported image mode: {0}")]
    UnsupportedImageMode(String),
    /// The input tensor does not match the model's declared input shape
    #[error("Shape mismatch: model expects {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<i64>,
        actual: Vec<usize>,
    },
    /// Error occurred while running the ONNX model
    #[error("Model error: {0}")]
    ModelError(String),
    /// The model produced an output that is not a valid probability vector
    #[error("Prediction error: {0}")]
    PredictionError(String),
}

impl ClassifierError {
    /// True when the request should be rejected and the user asked for a new upload.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            Self::ImageDecode(_) | Self::UnsupportedFormat(_) | Self::UnsupportedImageMode(_)
        )
    }
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}
