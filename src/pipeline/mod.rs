//! Request pipeline for background removal.
//!
//! [`RemovalPipeline`] owns every guard a request passes through and runs them
//! in a fixed order. The HTTP layer only extracts the raw inputs and renders
//! the result.

mod service;

pub use service::{Identity, RemovalPipeline, RemovalRequest};
