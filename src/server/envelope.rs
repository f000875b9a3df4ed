//! Uniform JSON error envelope.
//!
//! Every failure leaving the service, whatever stage raised it, is rendered
//! as the same shape:
//!
//! ```json
//! {
//!   "success": false,
//!   "error": "Invalid file type. Allowed types: .jpg, .png",
//!   "error_code": "VALIDATION_ERROR",
//!   "timestamp": "2024-01-01T12:00:00.000000Z",
//!   "details": { "path": "/api/remove-background", "method": "POST", "status_code": 400 }
//! }
//! ```
//!
//! Unclassified failures never expose their internal message. The client
//! sees "Internal server error" and the failure's category, and the full
//! message goes to the server log.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{ApiError, AuthError};

/// Message returned for failures that must not leak their cause.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

// =============================================================================
// Envelope Types
// =============================================================================

/// Request facts echoed back in error details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub path: String,
    pub method: String,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
        }
    }
}

/// Extra context attached to an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    /// Details for classified errors
    Request {
        path: String,
        method: String,
        status_code: u16,
    },

    /// Details for unclassified errors
    Internal { exception_type: String },
}

/// JSON body returned for every error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    /// Always `false`
    pub success: bool,

    /// Human-readable message
    pub error: String,

    /// Machine-readable code (e.g. "VALIDATION_ERROR")
    pub error_code: String,

    /// ISO-8601 UTC time the envelope was built
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl ErrorEnvelope {
    /// Build the envelope for `err` raised while serving `context`.
    pub fn for_error(err: &ApiError, context: &RequestContext) -> Self {
        let (message, details) = match err {
            ApiError::Unclassified { category, .. } => (
                INTERNAL_ERROR_MESSAGE.to_string(),
                ErrorDetails::Internal {
                    exception_type: category.to_string(),
                },
            ),
            other => (
                other.to_string(),
                ErrorDetails::Request {
                    path: context.path.clone(),
                    method: context.method.clone(),
                    status_code: other.status_code(),
                },
            ),
        };

        Self {
            success: false,
            error: message,
            error_code: err.error_code().to_string(),
            timestamp: now_iso8601(),
            details: Some(details),
        }
    }

    /// Serialize to JSON bytes.
    ///
    /// Never fails: if `serde_json` cannot serialize the envelope, a minimal
    /// hand-escaped document with the same top-level fields is returned.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| self.fallback_json().into_bytes())
    }

    fn fallback_json(&self) -> String {
        format!(
            "{{\"success\":false,\"error\":\"{}\",\"error_code\":\"{}\",\"timestamp\":\"{}\"}}",
            escape_json(&self.error),
            escape_json(&self.error_code),
            escape_json(&self.timestamp),
        )
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Escape `value` for inclusion inside a JSON string literal.
fn escape_json(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Seconds to advertise in `Retry-After`, rounded up and at least 1.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

// =============================================================================
// Error Reply
// =============================================================================

/// An [`ApiError`] bound to the request it failed, ready to be sent.
///
/// This is the single place errors are mapped to HTTP. Logging follows
/// severity:
/// - 5xx errors are logged at ERROR level with the internal message
/// - a missing credential is logged at DEBUG level (common and expected)
/// - other 4xx errors are logged at WARN level
#[derive(Debug, Clone)]
pub struct ErrorReply {
    pub error: ApiError,
    pub context: RequestContext,
}

impl ErrorReply {
    pub fn new(error: impl Into<ApiError>, context: RequestContext) -> Self {
        Self {
            error: error.into(),
            context,
        }
    }

    fn log(&self) {
        let status = self.error.status_code();
        let error_code = self.error.error_code();
        let path = self.context.path.as_str();

        match &self.error {
            ApiError::Unclassified { category, message } => error!(
                error_code = error_code,
                status = status,
                path = path,
                category = *category,
                "Unhandled error: {}",
                message
            ),
            ApiError::Processing(err) => error!(
                error_code = error_code,
                status = status,
                path = path,
                "Processing error: {}",
                err
            ),
            ApiError::Authentication(AuthError::MissingCredential) => debug!(
                error_code = error_code,
                status = status,
                path = path,
                "Request without credentials"
            ),
            other => warn!(
                error_code = error_code,
                status = status,
                path = path,
                "Client error: {}",
                other
            ),
        }
    }
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        self.log();

        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope::for_error(&self.error, &self.context);

        let mut response = Response::new(Body::from(envelope.to_json_bytes()));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        match &self.error {
            ApiError::Authentication(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            ApiError::RateLimitExceeded {
                retry_after: Some(wait),
            } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(*wait)));
            }
            _ => {}
        }

        response
    }
}

// =============================================================================
// Tests
// =============================================================================
