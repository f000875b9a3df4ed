//! Upload payloads and the trait the pipeline reads them through.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ValidationError;

/// What the client declared about an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    /// Byte size of the upload (`None` when unknown)
    pub size: Option<u64>,

    /// Client-supplied filename, if any
    pub filename: Option<String>,

    /// Client-supplied content-type, if any
    pub content_type: Option<String>,
}

impl UploadMetadata {
    /// Lower-cased extension of the filename, including the leading dot.
    ///
    /// Hidden files (`.png`) and names ending in a dot have no extension.
    pub fn extension(&self) -> Option<String> {
        let filename = self.filename.as_deref()?;
        let name = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(filename);
        let dot = name.rfind('.')?;
        if dot == 0 || dot + 1 == name.len() {
            return None;
        }
        Some(name[dot..].to_ascii_lowercase())
    }

    /// Declared content-type with parameters stripped, lower-cased.
    pub fn essence(&self) -> Option<String> {
        let content_type = self.content_type.as_deref()?;
        let essence = content_type.split(';').next().unwrap_or("").trim();
        if essence.is_empty() {
            None
        } else {
            Some(essence.to_ascii_lowercase())
        }
    }
}

/// An uploaded file: its declared metadata plus the received bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub metadata: UploadMetadata,
    pub bytes: Bytes,
}

impl Upload {
    /// Create an upload whose declared size is the length of `bytes`.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            metadata: UploadMetadata {
                size: Some(bytes.len() as u64),
                filename: Some(filename.into()),
                content_type: Some(content_type.into()),
            },
            bytes,
        }
    }

    /// Create an upload that was cut off after `seen` bytes because it grew
    /// past the size limit. The payload itself is dropped.
    pub fn oversized(metadata: UploadMetadata, seen: u64) -> Self {
        Self {
            metadata: UploadMetadata {
                size: Some(seen),
                ..metadata
            },
            bytes: Bytes::new(),
        }
    }
}

/// Source of the uploaded file for one request.
///
/// The pipeline calls [`read_upload`](UploadSource::read_upload) only after
/// the caller has been authenticated and admitted, so unauthorized clients
/// never get their bodies buffered. Implementations should stop buffering
/// once more than `max_bytes` have arrived and report the upload through
/// [`Upload::oversized`].
#[async_trait]
pub trait UploadSource: Send {
    async fn read_upload(&mut self, max_bytes: u64) -> Result<Upload, ValidationError>;
}

/// In-memory uploads are already fully buffered.
#[async_trait]
impl UploadSource for Upload {
    async fn read_upload(&mut self, _max_bytes: u64) -> Result<Upload, ValidationError> {
        Ok(self.clone())
    }
}
