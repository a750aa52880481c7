use image::imageops::{self, FilterType};
use ndarray::Array4;

use super::error::ClassifierError;
use super::scan::{ColorMode, ScanImage};

/// Default model input width in pixels.
pub const DEFAULT_WIDTH: u32 = 224;
/// Default model input height in pixels.
pub const DEFAULT_HEIGHT: u32 = 224;

const CHANNELS: usize = 3;

/// A batch of one RGB image laid out as `(1, height, width, 3)`, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Array4<f32>,
}

impl InputTensor {
    /// Wraps an NHWC array, checking it holds exactly one 3-channel image.
    pub fn from_array(data: Array4<f32>) -> Result<Self, ClassifierError> {
        let shape = data.shape();
        if shape[0] != 1 || shape[3] != CHANNELS {
            return Err(ClassifierError::ShapeMismatch {
                expected: vec![1, -1, -1, CHANNELS as i64],
                actual: shape.to_vec(),
            });
        }
        Ok(Self { data })
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }

    /// RGB values at `(row, col)` of the single batch entry.
    pub fn pixel(&self, row: usize, col: usize) -> [f32; 3] {
        [
            self.data[[0, row, col, 0]],
            self.data[[0, row, col, 1]],
            self.data[[0, row, col, 2]],
        ]
    }
}

/// Converts a scan into the model's input tensor.
///
/// The image is converted to RGB, resized to exactly `target_width` by
/// `target_height` with a Catmull-Rom filter, scaled from `[0, 255]` to
/// `[0.0, 1.0]` and given a leading batch dimension of 1.
///
/// # Errors
/// - `UnsupportedImageMode` if the pixel layout cannot be converted to RGB,
///   the image has a zero dimension, or a zero target size is requested
pub fn preprocess(
    image: &ScanImage,
    target_width: u32,
    target_height: u32,
) -> Result<InputTensor, ClassifierError> {
    if let ColorMode::Other(mode) = image.mode() {
        return Err(ClassifierError::UnsupportedImageMode(mode));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ClassifierError::UnsupportedImageMode(format!(
            "Image has no pixels ({}x{})",
            width, height
        )));
    }
    if target_width == 0 || target_height == 0 {
        return Err(ClassifierError::UnsupportedImageMode(format!(
            "Invalid target size {}x{}",
            target_width, target_height
        )));
    }

    let rgb = image.as_dynamic().to_rgb8();
    let resized = if rgb.dimensions() == (target_width, target_height) {
        rgb
    } else {
        imageops::resize(&rgb, target_width, target_height, FilterType::CatmullRom)
    };

    let values: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect();

    let data = Array4::from_shape_vec(
        (1, target_height as usize, target_width as usize, CHANNELS),
        values,
    )
    .map_err(|e| ClassifierError::UnsupportedImageMode(format!("Failed to build tensor: {}", e)))?;

    Ok(InputTensor { data })
}

/// Preprocesses to the default 224x224 model input.
pub fn preprocess_default(image: &ScanImage) -> Result<InputTensor, ClassifierError> {
    preprocess(image, DEFAULT_WIDTH, DEFAULT_HEIGHT)
}
