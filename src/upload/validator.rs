//! Two-phase upload validation.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader, Limits};

use crate::error::ValidationError;

use super::source::UploadMetadata;

/// Default maximum upload size: 50MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Default maximum width or height of an uploaded image.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 16_384;

/// Filename extensions accepted by default.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".bmp"];

/// Content-types accepted by default.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/bmp",
];

/// Formats the service can decode, whatever the allow-lists say.
const DECODABLE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

/// Map a filename extension (with leading dot) to the format it claims.
pub fn format_for_extension(extension: &str) -> Option<ImageFormat> {
    match extension.to_ascii_lowercase().as_str() {
        ".png" => Some(ImageFormat::Png),
        ".jpg" | ".jpeg" => Some(ImageFormat::Jpeg),
        ".webp" => Some(ImageFormat::WebP),
        ".bmp" => Some(ImageFormat::Bmp),
        _ => None,
    }
}

fn format_label(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::WebP => "WebP".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        other => format!("{:?}", other),
    }
}

// =============================================================================
// Upload Policy
// =============================================================================

/// Allow-lists and size limits applied to every upload.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Largest accepted upload in bytes
    pub max_file_size: u64,

    /// Lower-cased extensions including the leading dot (e.g. ".png")
    pub allowed_extensions: Vec<String>,

    /// Lower-cased content-type essences (e.g. "image/png")
    pub allowed_content_types: Vec<String>,

    /// Largest accepted width or height in pixels
    pub max_image_dimension: u32,
}

impl UploadPolicy {
    /// Build a policy, normalizing extensions and content-types.
    ///
    /// Extensions without a leading dot get one.
    pub fn new(
        max_file_size: u64,
        allowed_extensions: impl IntoIterator<Item = impl AsRef<str>>,
        allowed_content_types: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.as_ref().trim().to_ascii_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();

        let allowed_content_types = allowed_content_types
            .into_iter()
            .map(|ct| ct.as_ref().trim().to_ascii_lowercase())
            .collect();

        Self {
            max_file_size,
            allowed_extensions,
            allowed_content_types,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
        }
    }

    /// Set the largest accepted width or height.
    pub fn with_max_image_dimension(mut self, pixels: u32) -> Self {
        self.max_image_dimension = pixels;
        self
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_FILE_SIZE,
            DEFAULT_ALLOWED_EXTENSIONS.iter().copied(),
            DEFAULT_ALLOWED_CONTENT_TYPES.iter().copied(),
        )
    }
}

// =============================================================================
// Decoded Image
// =============================================================================

/// An upload that passed both validation phases.
///
/// Can only be produced by [`UploadValidator::decode`].
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl DecodedImage {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether the source carried an alpha channel.
    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    /// Format detected from the upload's bytes.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Decoded bitmap.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Take ownership of the decoded bitmap.
    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

// =============================================================================
// Upload Validator
// =============================================================================

/// Validates upload metadata and content.
#[derive(Debug, Clone, Default)]
pub struct UploadValidator {
    policy: UploadPolicy,
}

impl UploadValidator {
    /// Create a validator enforcing `policy`.
    pub fn new(policy: UploadPolicy) -> Self {
        Self { policy }
    }

    /// The policy in force.
    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Metadata phase: size, extension and content-type.
    ///
    /// Never looks at the bytes.
    pub fn validate_metadata(&self, metadata: &UploadMetadata) -> Result<(), ValidationError> {
        match metadata.size {
            None | Some(0) => return Err(ValidationError::EmptyFile),
            Some(size) if size > self.policy.max_file_size => {
                return Err(ValidationError::FileTooLarge {
                    max_bytes: self.policy.max_file_size,
                })
            }
            Some(_) => {}
        }

        let extension_allowed = metadata
            .extension()
            .is_some_and(|ext| self.policy.allowed_extensions.contains(&ext));
        if !extension_allowed {
            return Err(ValidationError::InvalidExtension {
                allowed: self.policy.allowed_extensions.join(", "),
            });
        }

        match metadata.essence() {
            Some(essence) if self.policy.allowed_content_types.contains(&essence) => Ok(()),
            _ => Err(ValidationError::InvalidContentType(
                metadata
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "<none>".to_string()),
            )),
        }
    }

    /// Content phase: structural parse, then a full integrity decode.
    ///
    /// `metadata` must already have passed [`validate_metadata`](Self::validate_metadata);
    /// its extension is cross-checked against the sniffed format.
    pub fn decode(
        &self,
        metadata: &UploadMetadata,
        bytes: &[u8],
    ) -> Result<DecodedImage, ValidationError> {
        // Structural parse: magic bytes and header
        let detected = image::guess_format(bytes)
            .map_err(|_| ValidationError::Undecodable("unrecognized image data".to_string()))?;

        if !DECODABLE_FORMATS.contains(&detected) {
            return Err(ValidationError::Undecodable(format!(
                "unsupported image format {}",
                format_label(detected)
            )));
        }

        if let Some(declared) = metadata.extension().as_deref().and_then(format_for_extension) {
            if declared != detected {
                return Err(ValidationError::FormatMismatch {
                    declared: format_label(declared),
                    detected: format_label(detected),
                });
            }
        }

        let (width, height) = ImageReader::with_format(Cursor::new(bytes), detected)
            .into_dimensions()
            .map_err(|e| ValidationError::Undecodable(e.to_string()))?;

        if width == 0 || height == 0 {
            return Err(ValidationError::Undecodable(
                "image has zero width or height".to_string(),
            ));
        }
        let max = self.policy.max_image_dimension;
        if width > max || height > max {
            return Err(ValidationError::Undecodable(format!(
                "image is {}x{}, larger than the {}px limit",
                width, height, max
            )));
        }

        // Integrity pass: decode every pixel of the same buffer
        let mut reader = ImageReader::with_format(Cursor::new(bytes), detected);
        reader.limits(self.decode_limits());
        let image = reader
            .decode()
            .map_err(|e| ValidationError::Undecodable(e.to_string()))?;

        if image.width() != width || image.height() != height {
            return Err(ValidationError::Undecodable(format!(
                "header declares {}x{} but {}x{} pixels decoded",
                width,
                height,
                image.width(),
                image.height()
            )));
        }

        Ok(DecodedImage {
            image,
            format: detected,
        })
    }

    fn decode_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.policy.max_image_dimension);
        limits.max_image_height = Some(self.policy.max_image_dimension);
        limits
    }
}

// =============================================================================
// Tests
// =============================================================================
