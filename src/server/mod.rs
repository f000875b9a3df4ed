//! HTTP server layer for the background removal API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              POST /api/remove-background                        │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │ (JWT bearer)│  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! │  ┌─────────────┐  ┌─────────────┐                               │
//! │  │  envelope   │  │  multipart  │                               │
//! │  │  (errors)   │  │  (uploads)  │                               │
//! │  └─────────────┘  └─────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod envelope;
pub mod handlers;
pub mod multipart;
pub mod routes;

pub use auth::{parse_bearer, Claims, IssuedToken, JwtAlgorithm, TokenAuth};
pub use envelope::{ErrorDetails, ErrorEnvelope, ErrorReply, RequestContext};
pub use handlers::{
    health_handler, metrics_handler, remove_background_handler, token_handler, AppState,
    HealthResponse, MetricsResponse, TokenResponse,
};
pub use multipart::MultipartUpload;
pub use routes::{create_router, RouterConfig};
