//! Removal pipeline orchestrating one background-removal request.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        RemovalPipeline                         │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │                         run()                            │  │
//! │  │  1. Start clock          6. Metadata phase               │  │
//! │  │  2. Authenticate         7. Content phase (blocking)     │  │
//! │  │  3. Parse output format  8. Invoke engine                │  │
//! │  │  4. Admit                9. Encode (blocking)            │  │
//! │  │  5. Read upload                                          │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! │        │             │             │             │             │
//! │        ▼             ▼             ▼             ▼             │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌───────────┐       │
//! │  │TokenAuth │  │RateWindow│  │ Upload   │  │ Inference │       │
//! │  │          │  │ Tracker  │  │Validator │  │ Invoker   │       │
//! │  └──────────┘  └──────────┘  └──────────┘  └───────────┘       │
//! │                                                  │             │
//! │                                                  ▼             │
//! │                                           ┌───────────────┐    │
//! │                                           │ResponseEncoder│    │
//! │                                           └───────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first failing stage ends the request. The upload body is not read
//! until the caller has been authenticated and admitted, and a request whose
//! output format is unknown is turned away before it is charged.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{ApiError, AuthError};
use crate::inference::{InferenceEngine, InferenceInvoker, DEFAULT_INFERENCE_TIMEOUT_SECS};
use crate::output::{EncodedOutput, OutputFormat, ResponseEncoder};
use crate::quota::{Decision, RateWindowTracker};
use crate::server::auth::{parse_bearer, IssuedToken, TokenAuth};
use crate::upload::{UploadPolicy, UploadSource, UploadValidator};

/// Category reported when a blocking-pool task fails to complete.
const TASK_JOIN_FAILURE: &str = "TaskJoinError";

// =============================================================================
// Request Types
// =============================================================================

/// Authenticated caller, taken from a verified token's subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw request inputs, before any validation.
#[derive(Debug, Clone, Default)]
pub struct RemovalRequest {
    /// Value of the `Authorization` header, if present
    pub authorization: Option<String>,

    /// Value of the `output_format` query parameter, if present
    pub output_format: Option<String>,
}

impl RemovalRequest {
    pub fn new(authorization: Option<String>, output_format: Option<String>) -> Self {
        Self {
            authorization,
            output_format,
        }
    }
}

// =============================================================================
// Removal Pipeline
// =============================================================================

/// Runs authentication, admission, validation, inference and encoding for
/// each request.
///
/// The pipeline is shared by all requests; the only state that outlives a
/// request is the rate limiter's window.
pub struct RemovalPipeline {
    auth: TokenAuth,
    limiter: Arc<RateWindowTracker>,
    validator: UploadValidator,
    invoker: InferenceInvoker,
    encoder: ResponseEncoder,
}

impl RemovalPipeline {
    /// Create a pipeline with default limits around `engine`.
    pub fn new(auth: TokenAuth, engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            auth,
            limiter: Arc::new(RateWindowTracker::default()),
            validator: UploadValidator::default(),
            invoker: InferenceInvoker::new(
                engine,
                Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS),
            ),
            encoder: ResponseEncoder::default(),
        }
    }

    /// Allow `max_requests` per identity within each `window`.
    pub fn with_rate_limit(self, max_requests: usize, window: Duration) -> Self {
        self.with_limiter(Arc::new(RateWindowTracker::new(max_requests, window)))
    }

    /// Use an existing (possibly shared) limiter.
    pub fn with_limiter(mut self, limiter: Arc<RateWindowTracker>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.validator = UploadValidator::new(policy);
        self
    }

    pub fn with_inference_timeout(mut self, deadline: Duration) -> Self {
        self.invoker = InferenceInvoker::new(self.invoker.engine(), deadline);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.encoder = ResponseEncoder::new(quality);
        self
    }

    pub fn auth(&self) -> &TokenAuth {
        &self.auth
    }

    pub fn limiter(&self) -> &Arc<RateWindowTracker> {
        &self.limiter
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        self.validator.policy()
    }

    /// Name of the inference engine in use.
    pub fn engine_name(&self) -> &str {
        self.invoker.engine_name()
    }

    /// Issue an access token for `user_id`.
    pub fn issue_token(&self, user_id: &str) -> Result<IssuedToken, ApiError> {
        self.auth.issue(user_id)
    }

    /// Verify the caller's credential and return their identity.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        let token = parse_bearer(authorization)?;
        let claims = self.auth.verify(token)?;
        Ok(Identity(claims.sub))
    }

    /// Count a request against `identity`'s quota.
    pub async fn admit(&self, identity: &Identity) -> Result<(), ApiError> {
        match self.limiter.check_now(identity.as_str()).await {
            Decision::Admitted { remaining } => {
                debug!(identity = %identity, remaining = remaining, "Request admitted");
                Ok(())
            }
            Decision::Rejected { retry_after } => Err(ApiError::RateLimitExceeded {
                retry_after: Some(retry_after),
            }),
        }
    }

    /// Process one background-removal request.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails; see the module
    /// documentation for the order.
    pub async fn run<U>(
        &self,
        request: RemovalRequest,
        mut upload: U,
    ) -> Result<EncodedOutput, ApiError>
    where
        U: UploadSource,
    {
        let started = Instant::now();

        let identity = self.authenticate(request.authorization.as_deref())?;
        let format = OutputFormat::from_query(request.output_format.as_deref())?;
        self.admit(&identity).await?;

        let upload = upload
            .read_upload(self.validator.policy().max_file_size)
            .await?;
        self.validator.validate_metadata(&upload.metadata)?;

        let decoded = {
            let validator = self.validator.clone();
            let metadata = upload.metadata.clone();
            let bytes = upload.bytes.clone();
            tokio::task::spawn_blocking(move || validator.decode(&metadata, &bytes))
                .await
                .map_err(|e| ApiError::unclassified(TASK_JOIN_FAILURE, e))??
        };
        drop(upload.bytes);

        debug!(
            identity = %identity,
            width = decoded.width(),
            height = decoded.height(),
            has_alpha = decoded.has_alpha(),
            "Upload validated"
        );

        let processed = self.invoker.invoke(decoded).await?;

        let encoder = self.encoder;
        let filename = upload.metadata.filename;
        let output = tokio::task::spawn_blocking(move || {
            encoder.encode_output(&processed, format, filename.as_deref(), started)
        })
        .await
        .map_err(|e| ApiError::unclassified(TASK_JOIN_FAILURE, e))??;

        info!(
            identity = %identity,
            width = output.original_width,
            height = output.original_height,
            format = %output.format,
            bytes = output.byte_len,
            elapsed_ms = output.processing_time.as_millis() as u64,
            "Background removed"
        );

        Ok(output)
    }
}

impl fmt::Debug for RemovalPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemovalPipeline")
            .field("auth", &self.auth)
            .field("max_requests", &self.limiter.max_requests())
            .field("window", &self.limiter.window())
            .field("invoker", &self.invoker)
            .field("encoder", &self.encoder)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
