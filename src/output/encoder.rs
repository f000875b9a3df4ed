//! Image encoder for response bodies.
//!
//! # Design Decisions
//!
//! - **Lossless where alpha survives**: PNG and WebP are written lossless with
//!   the full RGBA buffer, so the mask reaches the client unchanged.
//!
//! - **Flatten when alpha cannot survive**: formats without transparency
//!   (JPEG) get the image blended onto opaque white of identical size first,
//!   and the mask is discarded.
//!
//! - **Quality control**: JPEG quality is configured once for the process and
//!   clamped to 1-100.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageResult, RgbImage, RgbaImage};

use crate::error::ApiError;
use crate::inference::ProcessedImage;

use super::format::OutputFormat;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Category reported to clients when encoding fails.
const ENCODE_FAILURE: &str = "ImageEncodingError";

/// Clamp quality to the valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Encoded Output
// =============================================================================

/// An encoded response body and the facts reported alongside it.
#[derive(Debug, Clone)]
pub struct EncodedOutput {
    /// Encoded image bytes
    pub data: Bytes,

    /// Format of `data`
    pub format: OutputFormat,

    /// Length of `data`
    pub byte_len: usize,

    /// Time from pipeline start until encoding finished
    pub processing_time: Duration,

    /// Width of the uploaded image
    pub original_width: u32,

    /// Height of the uploaded image
    pub original_height: u32,

    /// Name suggested to the client for saving the result
    pub filename: String,
}

// =============================================================================
// Response Encoder
// =============================================================================

/// Encodes processed images into the requested output format.
#[derive(Debug, Clone, Copy)]
pub struct ResponseEncoder {
    jpeg_quality: u8,
}

impl ResponseEncoder {
    /// Create an encoder writing JPEG at `jpeg_quality` (clamped to 1-100).
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: clamp_quality(jpeg_quality),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Encode `image` as `format`.
    ///
    /// Runs synchronously; callers on the async runtime should move this onto
    /// the blocking pool.
    pub fn encode(&self, image: &ProcessedImage, format: OutputFormat) -> Result<Bytes, ApiError> {
        let rgba = image.image();
        let (width, height) = rgba.dimensions();
        let mut out = Cursor::new(Vec::new());

        let result = if format.supports_transparency() {
            let color = ExtendedColorType::Rgba8;
            self.write_pixels(&mut out, format, rgba.as_raw(), width, height, color)
        } else {
            let flat = composite_on_white(rgba);
            let color = ExtendedColorType::Rgb8;
            self.write_pixels(&mut out, format, flat.as_raw(), width, height, color)
        };
        result.map_err(|e| ApiError::unclassified(ENCODE_FAILURE, e))?;

        Ok(Bytes::from(out.into_inner()))
    }

    fn write_pixels(
        &self,
        out: &mut Cursor<Vec<u8>>,
        format: OutputFormat,
        pixels: &[u8],
        width: u32,
        height: u32,
        color: ExtendedColorType,
    ) -> ImageResult<()> {
        match format {
            OutputFormat::Png => PngEncoder::new(out).write_image(pixels, width, height, color),
            OutputFormat::Webp => {
                WebPEncoder::new_lossless(out).write_image(pixels, width, height, color)
            }
            OutputFormat::Jpeg => JpegEncoder::new_with_quality(out, self.jpeg_quality)
                .write_image(pixels, width, height, color),
        }
    }

    /// Encode `image` and assemble the full [`EncodedOutput`].
    ///
    /// `elapsed` is measured from pipeline start up to the moment this is
    /// called, plus the time spent encoding.
    pub fn encode_output(
        &self,
        image: &ProcessedImage,
        format: OutputFormat,
        original_filename: Option<&str>,
        started: std::time::Instant,
    ) -> Result<EncodedOutput, ApiError> {
        let data = self.encode(image, format)?;
        Ok(EncodedOutput {
            byte_len: data.len(),
            data,
            format,
            processing_time: started.elapsed(),
            original_width: image.width(),
            original_height: image.height(),
            filename: suggested_filename(original_filename, format),
        })
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Alpha-blend `image` onto opaque white of the same size.
pub fn composite_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// `processed_<stem>.<ext>` for the uploaded filename.
///
/// Directory components are dropped. Falls back to `image` when the upload
/// had no usable name.
pub fn suggested_filename(original: Option<&str>, format: OutputFormat) -> String {
    let stem = original
        .map(|name| name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name))
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("image");
    format!("processed_{}.{}", stem, format.extension())
}

// =============================================================================
// Tests
// =============================================================================
