//! Image conversion and resizing transforms.

use actors::{ResultPayload, SourceFile, Transform, TransformError, TransformFuture};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, imageops::FilterType};
use serde::{Deserialize, Serialize};

/// Encodings the image transforms can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    /// Lossy JPEG at the given quality (1-100).
    Jpeg { quality: u8 },
    /// Lossless WebP.
    Webp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    /// Keep the source encoding when it is one we can write, PNG otherwise.
    fn matching(format: Option<ImageFormat>, jpeg_quality: u8) -> Self {
        match format {
            Some(ImageFormat::Jpeg) => OutputFormat::Jpeg {
                quality: jpeg_quality,
            },
            Some(ImageFormat::WebP) => OutputFormat::Webp,
            _ => OutputFormat::Png,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageOpError {
    #[error("decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("encode {format}: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },

    #[error("image task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Swap the extension of a file name, or append one if it has none.
pub fn replace_extension(name: &str, extension: &str) -> String {
    let base_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match name[base_start..].rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{}", &name[..base_start + dot], extension),
        _ => format!("{name}.{extension}"),
    }
}

/// Largest size fitting in `max_edge` that keeps the aspect ratio.
pub fn calculate_target_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    if width >= height {
        let scaled_height = ((height as f64) * (max_edge as f64) / (width as f64)).round() as u32;
        (max_edge, scaled_height.max(1))
    } else {
        let scaled_width = ((width as f64) * (max_edge as f64) / (height as f64)).round() as u32;
        (scaled_width.max(1), max_edge)
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageOpError> {
    image::load_from_memory(bytes).map_err(ImageOpError::Decode)
}

fn encode(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, ImageOpError> {
    let mut out = Vec::new();
    let encode_err = |source| ImageOpError::Encode {
        format: format.extension(),
        source,
    };

    match format {
        OutputFormat::Png => image
            .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
            .map_err(encode_err)?,
        OutputFormat::Jpeg { quality } => {
            // JPEG has no alpha channel.
            let rgb = image.to_rgb8();
            let (width, height) = rgb.dimensions();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .encode(rgb.as_raw(), width, height, ColorType::Rgb8.into())
                .map_err(encode_err)?;
        }
        OutputFormat::Webp => {
            let rgba = image.to_rgba8();
            let (width, height) = rgba.dimensions();
            WebPEncoder::new_lossless(&mut out)
                .encode(rgba.as_raw(), width, height, ColorType::Rgba8.into())
                .map_err(encode_err)?;
        }
    }
    Ok(out)
}

fn convert(bytes: &[u8], format: OutputFormat) -> Result<Vec<u8>, ImageOpError> {
    encode(&decode(bytes)?, format)
}

fn resize(bytes: &[u8], max_edge: u32, jpeg_quality: u8) -> Result<Vec<u8>, ImageOpError> {
    let format = OutputFormat::matching(image::guess_format(bytes).ok(), jpeg_quality);
    let decoded = decode(bytes)?;
    let (width, height) = decoded.dimensions();
    let (target_width, target_height) = calculate_target_size(width, height, max_edge);

    let resized = if (target_width, target_height) == (width, height) {
        decoded
    } else {
        decoded.resize_exact(target_width, target_height, FilterType::Triangle)
    };
    encode(&resized, format)
}

/// Runs the CPU-bound image work off the async runtime.
async fn blocking<F>(job: F) -> Result<Vec<u8>, TransformError>
where
    F: FnOnce() -> Result<Vec<u8>, ImageOpError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(ImageOpError::from)
        .and_then(|result| result)
        .map_err(TransformError::from_error)
}

/// Re-encode images into another format.
pub struct ConvertImage {
    name: String,
    format: OutputFormat,
}

impl ConvertImage {
    pub fn new(name: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            name: name.into(),
            format,
        }
    }

    pub fn to_png() -> Self {
        Self::new("to-png", OutputFormat::Png)
    }

    /// JPEG re-encoding doubles as compression.
    pub fn to_jpeg(quality: u8) -> Self {
        Self::new("to-jpeg", OutputFormat::Jpeg { quality })
    }

    pub fn to_webp() -> Self {
        Self::new("to-webp", OutputFormat::Webp)
    }
}

impl Transform for ConvertImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, source: &SourceFile) -> TransformFuture {
        let format = self.format;
        let content = source.content.clone();
        let output_name = replace_extension(&source.name, format.extension());
        Box::pin(async move {
            let data = blocking(move || convert(&content, format)).await?;
            Ok(ResultPayload::named(output_name, data))
        })
    }
}

/// Shrink images so neither side exceeds `max_edge`, keeping their format.
pub struct ResizeImage {
    max_edge: u32,
    jpeg_quality: u8,
}

impl ResizeImage {
    pub fn new(max_edge: u32, jpeg_quality: u8) -> Self {
        Self {
            max_edge: max_edge.max(1),
            jpeg_quality,
        }
    }
}

impl Transform for ResizeImage {
    fn name(&self) -> &str {
        "resize"
    }

    fn transform(&self, source: &SourceFile) -> TransformFuture {
        let (max_edge, quality) = (self.max_edge, self.jpeg_quality);
        let content = source.content.clone();
        let source_name = source.name.clone();
        Box::pin(async move {
            let format = OutputFormat::matching(image::guess_format(&content).ok(), quality);
            let data = blocking(move || resize(&content, max_edge, quality)).await?;
            let output_name = match format {
                OutputFormat::Png if !source_name.to_ascii_lowercase().ends_with(".png") => {
                    replace_extension(&source_name, "png")
                }
                _ => source_name,
            };
            tracing::debug!("Resized {} to fit {}px", output_name, max_edge);
            Ok(ResultPayload::named(output_name, data))
        })
    }
}
