//! Response encoding.
//!
//! Turns a [`ProcessedImage`](crate::inference::ProcessedImage) into the bytes
//! sent back to the client, in the format the client asked for.
//!
//! | format | codec             | alpha                          |
//! |--------|-------------------|--------------------------------|
//! | png    | PNG               | kept                           |
//! | webp   | lossless WebP     | kept                           |
//! | jpeg   | baseline JPEG     | composited onto opaque white   |

mod encoder;
mod format;

pub use encoder::{
    clamp_quality, composite_on_white, suggested_filename, EncodedOutput, ResponseEncoder,
    DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use format::OutputFormat;
