//! # bgremove-api
//!
//! An authenticated HTTP service that removes the background from uploaded
//! images.
//!
//! Every request passes through the same guarded pipeline: the caller's
//! bearer token is verified, their per-identity quota is charged, the upload
//! is validated twice (declared metadata, then actual content), the image is
//! handed to an inference engine under a deadline, and the result is encoded
//! in the requested format. Any failure is rendered as one uniform JSON error
//! envelope.
//!
//! ## Features
//!
//! - **JWT bearer auth**: HMAC-signed tokens (HS256/384/512) with strict expiry
//! - **Sliding-window quotas**: Per-identity admission with atomic updates
//! - **Two-phase validation**: Allow-lists first, then a full integrity decode
//! - **Pluggable engines**: Any [`inference::InferenceEngine`] can be used
//! - **PNG, WebP and JPEG output**: Alpha kept or composited onto white
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`quota`] - Sliding-window rate limiting
//! - [`upload`] - Upload intake and two-phase validation
//! - [`inference`] - Engine trait, invoker and the built-in matte engine
//! - [`output`] - Output formats and response encoding
//! - [`pipeline`] - Request orchestration
//! - [`server`] - Axum-based HTTP server, auth and error envelope
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bgremove_api::{create_router, BorderMatteEngine, RemovalPipeline, RouterConfig, TokenAuth};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = RemovalPipeline::new(
//!         TokenAuth::new("my-secret-key"),
//!         Arc::new(BorderMatteEngine::default()),
//!     );
//!     let router = create_router(pipeline, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8001").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod inference;
pub mod output;
pub mod pipeline;
pub mod quota;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::{Cli, Command, ServeConfig, TokenConfig, TokenOutputFormat};
pub use error::{ApiError, AuthError, InferenceError, ValidationError};
pub use inference::{BorderMatteEngine, InferenceEngine, InferenceInvoker, ProcessedImage};
pub use output::{EncodedOutput, OutputFormat, ResponseEncoder};
pub use pipeline::{Identity, RemovalPipeline, RemovalRequest};
pub use quota::{Decision, RateWindowTracker};
pub use server::{
    create_router, parse_bearer, AppState, Claims, ErrorEnvelope, ErrorReply, IssuedToken,
    JwtAlgorithm, RequestContext, RouterConfig, TokenAuth,
};
pub use upload::{DecodedImage, Upload, UploadMetadata, UploadPolicy, UploadSource, UploadValidator};
