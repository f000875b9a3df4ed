use std::time::Duration;

use thiserror::Error;

/// Credential failures raised while verifying a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No Authorization header on the request
    #[error("Missing authentication credentials")]
    MissingCredential,

    /// Authorization header present but not of the form `Bearer <token>`
    #[error("Malformed authorization header: expected 'Bearer <token>'")]
    MalformedHeader,

    /// Token signature is valid but its expiry has passed
    #[error("Token has expired")]
    Expired,

    /// Token could not be decoded, has a bad signature, or lacks a subject
    #[error("Invalid token")]
    InvalidToken,
}

/// Upload and request-parameter failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Upload size is unknown or zero
    #[error("File is empty")]
    EmptyFile,

    /// Upload exceeds the configured maximum size
    #[error("File too large. Maximum size: {}MB", megabytes(.max_bytes))]
    FileTooLarge { max_bytes: u64 },

    /// Filename extension is not in the allow-list
    #[error("Invalid file type. Allowed types: {allowed}")]
    InvalidExtension { allowed: String },

    /// Declared content-type is not in the allow-list
    #[error("Invalid MIME type: {0}")]
    InvalidContentType(String),

    /// `output_format` selector is outside the supported set
    #[error("Invalid output format: {value} (expected one of: {expected})")]
    InvalidOutputFormat { value: String, expected: String },

    /// A required query parameter is missing or empty
    #[error("Missing required query parameter: {0}")]
    MissingParameter(String),

    /// The multipart body has no `file` field
    #[error("Missing file field in multipart body")]
    MissingFile,

    /// The request body could not be read as multipart form data
    #[error("Malformed multipart body: {0}")]
    MalformedUpload(String),

    /// Bytes are not a recognizable, intact image
    #[error("Invalid image format: {0}")]
    Undecodable(String),

    /// Bytes decode as a different format than the filename claims
    #[error("File content is {detected} but the filename declares {declared}")]
    FormatMismatch { declared: String, detected: String },
}

/// Failures from the background-removal engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// The engine reported a failure
    #[error("Inference failed: {0}")]
    Engine(String),

    /// The engine did not answer within the configured deadline
    #[error("Inference timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The engine returned an image of different size than its input
    #[error(
        "Engine returned a {actual_width}x{actual_height} image for a {expected_width}x{expected_height} input"
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

fn megabytes(bytes: &u64) -> String {
    format!("{:.1}", *bytes as f64 / (1024.0 * 1024.0))
}

/// Every way a background-removal request can fail.
///
/// Each variant maps to exactly one HTTP status and machine-readable code;
/// see [`ApiError::status_code`] and [`ApiError::error_code`].
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error(transparent)]
    Authentication(#[from] AuthError),

    /// The identity has used up its quota for the current window
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimitExceeded {
        /// Time until the oldest request in the window expires
        retry_after: Option<Duration>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Processing(#[from] InferenceError),

    /// Anything not covered above. `category` is safe to show callers,
    /// `message` is for server logs only.
    #[error("{category}: {message}")]
    Unclassified {
        category: &'static str,
        message: String,
    },
}

impl ApiError {
    /// Build an unclassified error from any displayable failure.
    pub fn unclassified(category: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Unclassified {
            category,
            message: err.to_string(),
        }
    }

    /// HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Authentication(_) => 401,
            ApiError::RateLimitExceeded { .. } => 429,
            ApiError::Validation(_) => 400,
            ApiError::Processing(_) => 500,
            ApiError::Unclassified { .. } => 500,
        }
    }

    /// Machine-readable error code for this error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Authentication(_) => "AUTHENTICATION_ERROR",
            ApiError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Processing(_) => "PROCESSING_ERROR",
            ApiError::Unclassified { .. } => "INTERNAL_ERROR",
        }
    }
}
