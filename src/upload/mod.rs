//! Upload intake and validation.
//!
//! An upload goes through two mandatory phases, in order:
//!
//! 1. **Metadata** – declared size, filename extension and content-type are
//!    checked against allow-lists. Nothing is decoded.
//! 2. **Content** – the bytes are sniffed, their header is parsed, and the
//!    full image is decoded under allocation limits. Spoofed extensions,
//!    truncated files and non-image payloads fail here even though their
//!    metadata looked fine.
//!
//! Only a buffer that passes both phases becomes a [`DecodedImage`].

mod source;
mod validator;

pub use source::{Upload, UploadMetadata, UploadSource};
pub use validator::{
    format_for_extension, DecodedImage, UploadPolicy, UploadValidator, DEFAULT_ALLOWED_CONTENT_TYPES,
    DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_IMAGE_DIMENSION,
};
