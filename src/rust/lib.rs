//! A chest X-ray/CT scan classifier that runs a pretrained CNN through ONNX
//! Runtime and sorts scans into `COVID-19 Positive`, `Normal` or
//! `Viral Pneumonia`.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use lungscan::{Classifier, ModelLoader, RuntimeConfig, ScanImage};
//!
//! let loader = ModelLoader::new("covid19_cnn_model.onnx", RuntimeConfig::default());
//! let classifier = Classifier::new(loader.load()?);
//!
//! let image = ScanImage::open("chest_xray.png")?;
//! let prediction = classifier.classify(&image)?;
//! println!("Predicted class: {} ({:.2}%)", prediction.label, prediction.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The model is loaded once per [`ModelLoader`] and shared through an `Arc`.
//! Later `load()` calls, from any thread, return the same handle:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use lungscan::{Classifier, ModelLoader, RuntimeConfig};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let loader = ModelLoader::new("covid19_cnn_model.onnx", RuntimeConfig::default());
//! let classifier = Arc::new(Classifier::new(loader.load()?));
//!
//! let mut handles = vec![];
//! for _ in 0..3 {
//!     let classifier = Arc::clone(&classifier);
//!     handles.push(thread::spawn(move || {
//!         let image = lungscan::ScanImage::open("chest_xray.png").unwrap();
//!         classifier.classify(&image).unwrap();
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod labels;
pub mod model_loader;
mod runtime;
pub mod web;

pub use classifier::{
    Classifier, ClassifierError, ClassifierInfo, ColorMode, ImageMetadata, InferenceModel,
    InputTensor, ModelHandle, OnnxModel, Prediction, ScanImage,
};
pub use config::{AppConfig, ModelConfig};
pub use labels::{Diagnosis, NUM_CLASSES};
pub use model_loader::{ModelError, ModelLoader};
pub use runtime::{create_session_builder, RuntimeConfig};

pub fn init_logger() {
    env_logger::init();
}
