//! Router configuration for the background removal API.
//!
//! This module defines the HTTP routes and applies middleware for CORS,
//! request tracing, body limits and panic capture.
//!
//! # Route Structure
//!
//! ```text
//! /health                    - Health check (public)
//! /auth/token                - Issue an access token (public)
//! /metrics                   - Limits and uptime (bearer token)
//! /api/remove-background     - Background removal (bearer token)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bgremove_api::inference::BorderMatteEngine;
//! use bgremove_api::pipeline::RemovalPipeline;
//! use bgremove_api::server::auth::TokenAuth;
//! use bgremove_api::server::routes::{create_router, RouterConfig};
//!
//! let pipeline = RemovalPipeline::new(
//!     TokenAuth::new("my-secret-key"),
//!     Arc::new(BorderMatteEngine::default()),
//! );
//!
//! let router = create_router(
//!     pipeline,
//!     RouterConfig::new().with_cors_origins(vec!["https://app.example".to_string()]),
//! );
//! axum::serve(tokio::net::TcpListener::bind("0.0.0.0:8001").await?, router).await?;
//! ```

use std::any::Any;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::envelope::{ErrorReply, RequestContext};
use super::handlers::{
    health_handler, metrics_handler, remove_background_handler, token_handler, AppState,
};
use crate::error::ApiError;
use crate::pipeline::RemovalPipeline;

/// Default allowance for multipart boundaries and part headers on top of the
/// file itself.
pub const DEFAULT_MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Default lifetime of a CORS preflight answer (24 hours).
pub const DEFAULT_CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

// =============================================================================
// Router Configuration
// =============================================================================

/// Transport-level settings for [`create_router`].
///
/// Everything request-specific (limits, auth, engine) lives on the
/// [`RemovalPipeline`]; this only shapes the HTTP layer around it.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origins allowed to call the API from a browser. `None` means any.
    pub cors_origins: Option<Vec<String>>,

    /// How long browsers may cache a preflight response
    pub cors_max_age: Duration,

    /// Bytes allowed in the request body beyond the pipeline's file limit
    pub multipart_overhead: usize,

    /// Attach a `TraceLayer` span to every request
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Any origin, 24h preflight cache, 1MiB multipart allowance, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cors_max_age: DEFAULT_CORS_MAX_AGE,
            multipart_overhead: DEFAULT_MULTIPART_OVERHEAD,
            enable_tracing: true,
        }
    }

    /// Restrict browser access to `origins`. An empty list blocks every
    /// cross-origin caller.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cors_max_age(mut self, max_age: Duration) -> Self {
        self.cors_max_age = max_age;
        self
    }

    pub fn with_multipart_overhead(mut self, bytes: usize) -> Self {
        self.multipart_overhead = bytes;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Request body limit for a pipeline accepting files up to
    /// `max_file_size` bytes.
    pub fn body_limit(&self, max_file_size: u64) -> usize {
        usize::try_from(max_file_size)
            .unwrap_or(usize::MAX)
            .saturating_add(self.multipart_overhead)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Build the router serving `pipeline`.
///
/// The body limit sits above the pipeline's file limit, so an oversized
/// upload is reported by the pipeline as "File too large" instead of being
/// cut off by the transport.
pub fn create_router(pipeline: RemovalPipeline, config: RouterConfig) -> Router {
    let body_limit = config.body_limit(pipeline.upload_policy().max_file_size);
    let app_state = AppState::new(pipeline);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/token", post(token_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/remove-background", post(remove_background_handler))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Render a handler panic as an `INTERNAL_ERROR` envelope.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ErrorReply::new(
        ApiError::unclassified("Panic", message),
        RequestContext::new("", ""),
    )
    .into_response()
}

/// CORS for the browser upload flow: GET/POST plus preflight, with the
/// `Authorization` and `Content-Type` request headers.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(config.cors_max_age);

    let Some(origins) = &config.cors_origins else {
        return cors.allow_origin(AnyOrigin);
    };

    // Unparseable origins are skipped; an empty list leaves CORS closed
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if allowed.is_empty() {
        cors
    } else {
        cors.allow_origin(allowed)
    }
}

// =============================================================================
// Tests
// =============================================================================
