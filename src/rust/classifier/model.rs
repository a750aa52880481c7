use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use ort::session::Session;
use ort::value::{Tensor, ValueType};

use super::error::ClassifierError;
use super::preprocess::InputTensor;
use crate::model_loader::ModelError;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// A loaded classification network that maps one input tensor to a
/// probability vector.
///
/// Implementations must be immutable after construction so a single handle can
/// serve any number of requests, from any thread.
pub trait InferenceModel: Send + Sync + fmt::Debug {
    /// Declared input shape; `-1` marks a dynamic dimension.
    fn input_shape(&self) -> &[i64];

    /// Runs one forward pass and returns the raw output values.
    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifierError>;
}

/// Shared, read-only handle to the process-wide model.
pub type ModelHandle = Arc<dyn InferenceModel>;

/// An ONNX export of the scan classifier, executed with ONNX Runtime.
///
/// The network is expected to:
/// - Accept one float input of shape `[batch, height, width, 3]`
/// - Output class probabilities of shape `[batch, 3]` (softmax already applied)
#[derive(Debug)]
pub struct OnnxModel {
    path: PathBuf,
    session: Session,
    input_name: String,
    input_shape: Vec<i64>,
}

impl OnnxModel {
    /// Reads and parses the artifact at `path` into a runnable session.
    ///
    /// # Errors
    /// - `ArtifactNotFound` if nothing exists at `path`
    /// - `ArtifactCorrupt` if ONNX Runtime rejects the file or its inputs and
    ///   outputs do not fit an image classifier
    pub fn from_file<P: AsRef<Path>>(path: P, config: &RuntimeConfig) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ModelError::ArtifactNotFound(path.to_path_buf()),
            _ => ModelError::IoError(e),
        })?;
        Self::from_bytes(path, &bytes, config)
    }

    /// Parses an artifact already read into memory. `path` is only kept for
    /// diagnostics.
    pub fn from_bytes<P: AsRef<Path>>(
        path: P,
        bytes: &[u8],
        config: &RuntimeConfig,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let session = create_session_builder(config)
            .and_then(|builder| builder.commit_from_memory(bytes))
            .map_err(|e| ModelError::ArtifactCorrupt(format!("{}: {}", path.display(), e)))?;

        let (input_name, input_shape) = Self::validate_model(&session)?;
        info!("Loaded ONNX model from {:?} (input '{}' {:?})", path, input_name, input_shape);

        Ok(Self {
            path: path.to_path_buf(),
            session,
            input_name,
            input_shape,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks the session has a rank-4 tensor input and at least one output.
    fn validate_model(session: &Session) -> Result<(String, Vec<i64>), ModelError> {
        let input = session.inputs.first().ok_or_else(|| {
            ModelError::ArtifactCorrupt("Model must have an image input".to_string())
        })?;

        let dimensions = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => dimensions.clone(),
            other => {
                return Err(ModelError::ArtifactCorrupt(format!(
                    "Model input '{}' must be a tensor, found {:?}",
                    input.name, other
                )))
            }
        };
        if dimensions.len() != 4 {
            return Err(ModelError::ArtifactCorrupt(format!(
                "Model input '{}' must be rank 4 [batch, height, width, channels], found {:?}",
                input.name, dimensions
            )));
        }

        if session.outputs.is_empty() {
            return Err(ModelError::ArtifactCorrupt(
                "Model must have at least 1 output for class probabilities".to_string(),
            ));
        }

        Ok((input.name.clone(), dimensions))
    }
}

impl InferenceModel for OnnxModel {
    fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifierError> {
        let array = input.as_array().as_standard_layout().into_owned();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            self.input_name.as_str(),
            Tensor::from_array(array)
                .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?,
        );

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        Ok(output_tensor.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let result = OnnxModel::from_file("/nonexistent/lungscan/model.onnx", &RuntimeConfig::default());
        assert!(matches!(result, Err(ModelError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = std::env::temp_dir().join("lungscan-test-onnx");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("garbage.onnx");
        fs::write(&path, "this is not a protobuf model").unwrap();

        let result = OnnxModel::from_file(&path, &RuntimeConfig::default());
        assert!(matches!(result, Err(ModelError::ArtifactCorrupt(_))));
    }
}
