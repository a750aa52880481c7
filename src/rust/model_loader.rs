use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};

use crate::classifier::predict::check_shape;
use crate::classifier::{ModelHandle, OnnxModel};
use crate::runtime::RuntimeConfig;

/// Failures while loading the model artifact. All of them are fatal for a
/// serving process: nothing can be classified without a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(PathBuf),
    #[error("Model artifact is corrupt: {0}")]
    ArtifactCorrupt(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Function that parses the artifact bytes read from a path into a model handle.
pub type LoadFn = dyn Fn(&Path, &[u8]) -> Result<ModelHandle, ModelError> + Send + Sync;

/// Loads the classifier artifact once and hands out the cached handle.
///
/// The first successful [`load`](ModelLoader::load) reads the file once, checks
/// the digest of those bytes and parses them; every later call returns a clone
/// of the same `Arc`. The cache sits behind a
/// mutex, so concurrent first calls still parse the artifact exactly once.
/// Failed loads are not cached.
#[derive(Clone)]
pub struct ModelLoader {
    model_path: PathBuf,
    expected_sha256: Option<String>,
    input_size: Option<(u32, u32)>,
    load_fn: Arc<LoadFn>,
    handle: Arc<Mutex<Option<ModelHandle>>>,
}

impl fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLoader")
            .field("model_path", &self.model_path)
            .field("expected_sha256", &self.expected_sha256)
            .field("input_size", &self.input_size)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ModelLoader {
    /// Creates a loader that parses `model_path` as an ONNX model.
    pub fn new<P: AsRef<Path>>(model_path: P, config: RuntimeConfig) -> Self {
        Self::with_load_fn(model_path, move |path: &Path, bytes: &[u8]| {
            let model = OnnxModel::from_bytes(path, bytes, &config)?;
            Ok(Arc::new(model) as ModelHandle)
        })
    }

    /// Creates a loader with a custom parse step, e.g. another inference backend.
    pub fn with_load_fn<P, F>(model_path: P, load_fn: F) -> Self
    where
        P: AsRef<Path>,
        F: Fn(&Path, &[u8]) -> Result<ModelHandle, ModelError> + Send + Sync + 'static,
    {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            expected_sha256: None,
            input_size: None,
            load_fn: Arc::new(load_fn),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Requires the artifact's SHA-256 digest (lowercase hex) to match before parsing.
    pub fn with_sha256(mut self, hash: impl Into<String>) -> Self {
        self.expected_sha256 = Some(hash.into().to_ascii_lowercase());
        self
    }

    /// Requires the model to accept a `(1, height, width, 3)` tensor.
    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_size = Some((width, height));
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn is_loaded(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns the cached model handle, loading the artifact on first use.
    ///
    /// # Errors
    /// - `ArtifactNotFound` if the artifact path does not exist
    /// - `ArtifactCorrupt` if the digest does not match, the file cannot be
    ///   parsed into a model, or the model input does not fit the configured
    ///   input size
    pub fn load(&self) -> Result<ModelHandle, ModelError> {
        let mut cached = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = cached.as_ref() {
            log::debug!("Reusing cached model from {:?}", self.model_path);
            return Ok(Arc::clone(handle));
        }

        log::info!("Loading model from {:?}", self.model_path);
        let bytes = fs::read(&self.model_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                log::error!("Model artifact not found at {:?}", self.model_path);
                ModelError::ArtifactNotFound(self.model_path.clone())
            }
            _ => ModelError::IoError(e),
        })?;

        if let Some(expected) = &self.expected_sha256 {
            self.verify_bytes(&bytes, expected)?;
        }

        let handle = (self.load_fn)(&self.model_path, &bytes)?;
        if let Some((width, height)) = self.input_size {
            self.verify_input_shape(handle.input_shape(), width, height)?;
        }
        log::info!("Model ready (input shape {:?})", handle.input_shape());
        *cached = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn verify_bytes(&self, bytes: &[u8], expected_hash: &str) -> Result<(), ModelError> {
        log::info!("Verifying file: {:?}", self.model_path);
        let actual = sha256_hex(bytes);
        log::info!("Calculated hash: {}", actual);
        log::info!("Expected hash:   {}", expected_hash);
        if actual != expected_hash {
            log::error!("Model hash mismatch: expected {}, got {}", expected_hash, actual);
            return Err(ModelError::ArtifactCorrupt(format!(
                "Hash mismatch for {}: expected {}, got {}",
                self.model_path.display(),
                expected_hash,
                actual
            )));
        }
        Ok(())
    }

    fn verify_input_shape(&self, declared: &[i64], width: u32, height: u32) -> Result<(), ModelError> {
        let configured = [1, height as usize, width as usize, 3];
        check_shape(declared, &configured).map_err(|_| {
            log::error!(
                "Model input {:?} cannot accept preprocessed scans of shape {:?}",
                declared,
                configured
            );
            ModelError::ArtifactCorrupt(format!(
                "{}: model input {:?} does not accept tensors of shape {:?}",
                self.model_path.display(),
                declared,
                configured
            ))
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String, ModelError> {
    Ok(sha256_hex(&fs::read(path)?))
}
