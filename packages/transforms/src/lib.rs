//! Built-in transforms for the batch pipeline.
//!
//! - `identity`, `uppercase-name`: pass content through
//! - `to-png`, `to-jpeg`, `to-webp`: re-encode images
//! - `resize`: bound the longest image edge

mod image_ops;
mod rename;

use actors::TransformRegistry;
use serde::{Deserialize, Serialize};

pub use image_ops::{
    ConvertImage, ImageOpError, OutputFormat, ResizeImage, calculate_target_size,
    replace_extension,
};
pub use rename::{Identity, UppercaseName};

/// Tunables for the built-in image transforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// JPEG quality (1-100) for `to-jpeg` and resized JPEGs.
    pub jpeg_quality: u8,
    /// Longest edge in pixels for `resize`.
    pub max_edge: u32,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_edge: 1920,
        }
    }
}

/// Registry holding every built-in transform.
pub fn builtin_registry(options: &TransformOptions) -> TransformRegistry {
    TransformRegistry::new()
        .with(Identity)
        .with(UppercaseName)
        .with(ConvertImage::to_png())
        .with(ConvertImage::to_jpeg(options.jpeg_quality))
        .with(ConvertImage::to_webp())
        .with(ResizeImage::new(options.max_edge, options.jpeg_quality))
}
