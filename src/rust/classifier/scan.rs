use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;
use std::fmt;
use std::path::Path;

use super::error::ClassifierError;

/// File extensions accepted for uploaded scans.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Pixel layout of a decoded scan, named the way imaging tools usually report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorMode {
    L,
    La,
    Rgb,
    Rgba,
    L16,
    La16,
    Rgb16,
    Rgba16,
    Rgb32F,
    Rgba32F,
    /// A layout the decoder produced but the preprocessor cannot convert
    Other(String),
}

impl From<ColorType> for ColorMode {
    fn from(color: ColorType) -> Self {
        match color {
            ColorType::L8 => ColorMode::L,
            ColorType::La8 => ColorMode::La,
            ColorType::Rgb8 => ColorMode::Rgb,
            ColorType::Rgba8 => ColorMode::Rgba,
            ColorType::L16 => ColorMode::L16,
            ColorType::La16 => ColorMode::La16,
            ColorType::Rgb16 => ColorMode::Rgb16,
            ColorType::Rgba16 => ColorMode::Rgba16,
            ColorType::Rgb32F => ColorMode::Rgb32F,
            ColorType::Rgba32F => ColorMode::Rgba32F,
            other => ColorMode::Other(format!("{:?}", other)),
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorMode::L => "L",
            ColorMode::La => "LA",
            ColorMode::Rgb => "RGB",
            ColorMode::Rgba => "RGBA",
            ColorMode::L16 => "I;16",
            ColorMode::La16 => "LA;16",
            ColorMode::Rgb16 => "RGB;16",
            ColorMode::Rgba16 => "RGBA;16",
            ColorMode::Rgb32F => "RGB;F",
            ColorMode::Rgba32F => "RGBA;F",
            ColorMode::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// Format, mode and pixel size of an uploaded scan, shown next to the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub format: String,
    pub mode: String,
    pub width: u32,
    pub height: u32,
}

/// A decoded scan owned by the request that uploaded it.
#[derive(Debug, Clone)]
pub struct ScanImage {
    image: DynamicImage,
    format: Option<ImageFormat>,
}

impl ScanImage {
    /// Decodes raw bytes, sniffing the container format from the content.
    pub fn decode(bytes: &[u8]) -> Result<Self, ClassifierError> {
        if bytes.is_empty() {
            return Err(ClassifierError::ImageDecode("No image data".into()));
        }
        let format = image::guess_format(bytes)
            .map_err(|e| ClassifierError::ImageDecode(e.to_string()))?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ClassifierError::ImageDecode(e.to_string()))?;
        Ok(Self {
            image,
            format: Some(format),
        })
    }

    /// Decodes an upload after checking its declared file name against the
    /// accepted extensions.
    pub fn decode_upload(bytes: &[u8], file_name: Option<&str>) -> Result<Self, ClassifierError> {
        if let Some(name) = file_name {
            check_extension(name)?;
        }
        Self::decode(bytes)
    }

    /// Reads and decodes a scan from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        check_extension(&path.to_string_lossy())?;
        let bytes = std::fs::read(path)
            .map_err(|e| ClassifierError::ImageDecode(format!("{}: {}", path.display(), e)))?;
        Self::decode(&bytes)
    }

    /// Wraps an already decoded image with no known source format.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image, format: None }
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn mode(&self) -> ColorMode {
        ColorMode::from(self.image.color())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn metadata(&self) -> ImageMetadata {
        let (width, height) = self.dimensions();
        ImageMetadata {
            format: self
                .format
                .map(format_name)
                .unwrap_or_else(|| "unknown".to_string()),
            mode: self.mode().to_string(),
            width,
            height,
        }
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Jpeg => "JPEG".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

/// Rejects file names whose extension is not png, jpg or jpeg.
pub fn check_extension(file_name: &str) -> Result<(), ClassifierError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ClassifierError::UnsupportedFormat(file_name.to_string()))?;

    if ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(ClassifierError::UnsupportedFormat(file_name.to_string()))
    }
}
