//! Multipart form uploads.

use async_trait::async_trait;
use axum::extract::multipart::{Multipart, MultipartRejection};
use bytes::BytesMut;
use tracing::debug;

use crate::error::ValidationError;
use crate::upload::{Upload, UploadMetadata, UploadSource};

/// Name of the form field carrying the image.
pub const FILE_FIELD: &str = "file";

/// An upload arriving as `multipart/form-data`.
///
/// Wraps the extractor result so that a body that is not multipart at all is
/// reported only when the pipeline reads the upload, after authentication.
pub struct MultipartUpload {
    inner: Result<Multipart, MultipartRejection>,
}

impl MultipartUpload {
    pub fn new(inner: Result<Multipart, MultipartRejection>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl UploadSource for MultipartUpload {
    /// Read the `file` field, skipping any other fields.
    ///
    /// Stops buffering once more than `max_bytes` have arrived.
    async fn read_upload(&mut self, max_bytes: u64) -> Result<Upload, ValidationError> {
        let multipart = self
            .inner
            .as_mut()
            .map_err(|rejection| ValidationError::MalformedUpload(rejection.body_text()))?;

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| ValidationError::MalformedUpload(e.body_text()))?
        {
            if field.name() != Some(FILE_FIELD) {
                debug!(field = field.name().unwrap_or(""), "Skipping form field");
                continue;
            }

            let metadata = UploadMetadata {
                size: None,
                filename: field.file_name().map(str::to_string),
                content_type: field.content_type().map(str::to_string),
            };

            let mut buf = BytesMut::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| ValidationError::MalformedUpload(e.body_text()))?
            {
                buf.extend_from_slice(&chunk);
                if buf.len() as u64 > max_bytes {
                    debug!(seen = buf.len(), max_bytes = max_bytes, "Upload exceeds size limit");
                    return Ok(Upload::oversized(metadata, buf.len() as u64));
                }
            }

            let bytes = buf.freeze();
            return Ok(Upload {
                metadata: UploadMetadata {
                    size: Some(bytes.len() as u64),
                    ..metadata
                },
                bytes,
            });
        }

        Err(ValidationError::MissingFile)
    }
}
