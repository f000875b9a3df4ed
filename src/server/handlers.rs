//! HTTP request handlers for the background removal API.
//!
//! # Endpoints
//!
//! - `POST /api/remove-background` - Remove the background from an image
//! - `POST /auth/token` - Issue an access token
//! - `GET /health` - Health check endpoint
//! - `GET /metrics` - Service limits and uptime (bearer token)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{
        multipart::{Multipart, MultipartRejection},
        OriginalUri, RawQuery, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ValidationError};
use crate::output::EncodedOutput;
use crate::pipeline::{RemovalPipeline, RemovalRequest};

use super::envelope::{ErrorReply, RequestContext};
use super::multipart::MultipartUpload;

/// Header reporting seconds spent processing the request.
pub const PROCESSING_TIME_HEADER: &str = "X-Processing-Time";

/// Header reporting the uploaded image's `WIDTHxHEIGHT`.
pub const ORIGINAL_SIZE_HEADER: &str = "X-Original-Size";

/// Header reporting the response body length in bytes.
pub const FILE_SIZE_HEADER: &str = "X-File-Size";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the removal pipeline.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RemovalPipeline>,

    /// Wall-clock time the state was created
    pub started_at: DateTime<Utc>,

    /// Monotonic start, for uptime
    started: Instant,
}

impl AppState {
    pub fn new(pipeline: RemovalPipeline) -> Self {
        Self::with_shared_pipeline(Arc::new(pipeline))
    }

    /// Share an existing pipeline.
    pub fn with_shared_pipeline(pipeline: Arc<RemovalPipeline>) -> Self {
        Self {
            pipeline,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Response from the token endpoint.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Always "bearer"
    pub token_type: String,

    /// Token lifetime in seconds
    pub expires_in: i64,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Name of the inference engine
    pub engine: String,
}

/// Service metrics response.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    /// Name of the inference engine
    pub engine: String,

    /// RFC 3339 start time
    pub started_at: String,

    pub uptime_seconds: u64,

    pub rate_limit: RateLimitMetrics,

    pub upload_limits: UploadLimitMetrics,
}

#[derive(Debug, Serialize)]
pub struct RateLimitMetrics {
    pub max_requests: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadLimitMetrics {
    pub max_file_size: u64,
    pub max_image_dimension: u32,
    pub allowed_extensions: Vec<String>,
}

// =============================================================================
// Request Helpers
// =============================================================================

/// First value of `name` in a raw `application/x-www-form-urlencoded` query.
///
/// A value that is not valid percent-encoded UTF-8 is returned as written,
/// so a present parameter never looks absent.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    for pair in query?.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if decode_component(key) == name {
            return Some(decode_component(value));
        }
    }
    None
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// `Authorization` header as text. Non-UTF-8 bytes are replaced so the value
/// still fails verification rather than looking absent.
fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// `Content-Disposition` value with an ASCII `filename` and an RFC 5987
/// `filename*` carrying the exact name.
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

fn image_response(output: EncodedOutput) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, output.format.mime_type())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&output.filename),
        )
        .header(
            PROCESSING_TIME_HEADER,
            format!("{:.4}", output.processing_time.as_secs_f64()),
        )
        .header(
            ORIGINAL_SIZE_HEADER,
            format!("{}x{}", output.original_width, output.original_height),
        )
        .header(FILE_SIZE_HEADER, output.byte_len.to_string())
        .body(Body::from(output.data))
        .map_err(|e| ApiError::unclassified("ResponseBuildError", e))
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle background removal requests.
///
/// # Endpoint
///
/// `POST /api/remove-background?output_format=png|webp|jpeg`
///
/// # Request
///
/// - `Authorization: Bearer <token>`
/// - `multipart/form-data` body with a `file` field
///
/// # Response
///
/// - `200 OK`: the processed image
/// - `400 Bad Request`: invalid upload or output format
/// - `401 Unauthorized`: missing, malformed, expired or invalid token
/// - `429 Too Many Requests`: quota used up
/// - `500 Internal Server Error`: inference or encoding failed
///
/// # Headers
///
/// - `Content-Type: image/<format>`
/// - `Content-Disposition: attachment; filename="processed_<stem>.<ext>"`
/// - `X-Processing-Time`, `X-Original-Size`, `X-File-Size`
pub async fn remove_background_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ErrorReply> {
    let context = RequestContext::new(uri.path(), method.as_str());
    let request = RemovalRequest::new(
        authorization(&headers),
        query_param(query.as_deref(), "output_format"),
    );

    let result = state
        .pipeline
        .run(request, MultipartUpload::new(multipart))
        .await
        .and_then(image_response);

    result.map_err(|e| ErrorReply::new(e, context))
}

/// Handle token requests.
///
/// # Endpoint
///
/// `POST /auth/token?user_id=<id>`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "access_token": "eyJhbGciOi...",
///   "token_type": "bearer",
///   "expires_in": 1800
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: `user_id` missing or empty
pub async fn token_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    RawQuery(query): RawQuery,
) -> Result<Json<TokenResponse>, ErrorReply> {
    let context = RequestContext::new(uri.path(), method.as_str());

    let user_id = query_param(query.as_deref(), "user_id")
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            ErrorReply::new(
                ValidationError::MissingParameter("user_id".to_string()),
                context.clone(),
            )
        })?;

    let issued = state
        .pipeline
        .issue_token(&user_id)
        .map_err(|e| ErrorReply::new(e, context))?;

    info!(user_id = %user_id, "Issued access token");

    Ok(Json(TokenResponse {
        expires_in: issued.expires_in(),
        access_token: issued.token,
        token_type: "bearer".to_string(),
    }))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "engine": "border-matte"
/// }
/// ```
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: state.pipeline.engine_name().to_string(),
    })
}

/// Handle metrics requests.
///
/// # Endpoint
///
/// `GET /metrics` with `Authorization: Bearer <token>`
///
/// # Response
///
/// `200 OK` with the engine name, start time, uptime and the configured rate
/// and upload limits. `401 Unauthorized` without a valid token.
pub async fn metrics_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Json<MetricsResponse>, ErrorReply> {
    let context = RequestContext::new(uri.path(), method.as_str());
    let pipeline = &state.pipeline;

    pipeline
        .authenticate(authorization(&headers).as_deref())
        .map_err(|e| ErrorReply::new(e, context))?;

    let policy = pipeline.upload_policy();
    Ok(Json(MetricsResponse {
        engine: pipeline.engine_name().to_string(),
        started_at: state.started_at.to_rfc3339(),
        uptime_seconds: state.uptime_seconds(),
        rate_limit: RateLimitMetrics {
            max_requests: pipeline.limiter().max_requests(),
            window_seconds: pipeline.limiter().window().as_secs(),
        },
        upload_limits: UploadLimitMetrics {
            max_file_size: policy.max_file_size,
            max_image_dimension: policy.max_image_dimension,
            allowed_extensions: policy.allowed_extensions.clone(),
        },
    }))
}

// =============================================================================
// Tests
// =============================================================================
