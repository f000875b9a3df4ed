//! Configuration management for the background removal API.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `BGR_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use bgremove_api::config::{Cli, Command};
//! use clap::Parser;
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Token(config) => println!("Token for {}", config.user_id),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `BGR_HOST` - Server bind address (default: 0.0.0.0)
//! - `BGR_PORT` - Server port (default: 8001)
//! - `BGR_SECRET_KEY` - HMAC secret for signing tokens (required)
//! - `BGR_JWT_ALGORITHM` - hs256, hs384 or hs512 (default: hs256)
//! - `BGR_TOKEN_EXPIRE_MINUTES` - Token lifetime (default: 30)
//! - `BGR_MAX_FILE_SIZE` - Upload size limit in bytes (default: 50MB)
//! - `BGR_ALLOWED_EXTENSIONS` - Comma-separated extension allow-list
//! - `BGR_ALLOWED_CONTENT_TYPES` - Comma-separated content-type allow-list
//! - `BGR_MAX_IMAGE_DIMENSION` - Largest accepted width or height (default: 16384)
//! - `BGR_RATE_LIMIT_REQUESTS` - Requests per identity per window (default: 100)
//! - `BGR_RATE_LIMIT_WINDOW` - Window length in seconds (default: 3600)
//! - `BGR_INFERENCE_TIMEOUT` - Inference deadline in seconds (default: 120)
//! - `BGR_JPEG_QUALITY` - JPEG output quality (default: 95)
//! - `BGR_MATTE_TOLERANCE` / `BGR_MATTE_FEATHER` - Built-in engine keying (default: 48 / 32)
//! - `BGR_CORS_ORIGINS` - Comma-separated CORS origins (default: any)

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::inference::{
    DEFAULT_INFERENCE_TIMEOUT_SECS, DEFAULT_MATTE_FEATHER, DEFAULT_MATTE_TOLERANCE,
};
use crate::output::DEFAULT_JPEG_QUALITY;
use crate::quota::{DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS};
use crate::server::auth::{JwtAlgorithm, TokenAuth, DEFAULT_TOKEN_EXPIRE_MINUTES};
use crate::upload::{UploadPolicy, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_IMAGE_DIMENSION};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8001;

/// Default extension allow-list, as accepted on the command line.
const DEFAULT_EXTENSIONS_ARG: &str = ".jpg,.jpeg,.png,.webp,.bmp";

/// Default content-type allow-list, as accepted on the command line.
const DEFAULT_CONTENT_TYPES_ARG: &str = "image/jpeg,image/jpg,image/png,image/webp,image/bmp";

// =============================================================================
// CLI Arguments
// =============================================================================

/// bgremove-api - An authenticated HTTP service that removes image backgrounds.
#[derive(Parser, Debug, Clone)]
#[command(name = "bgremove-api")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeConfig),

    /// Issue an access token for a user
    Token(TokenConfig),
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// Configuration for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "BGR_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "BGR_PORT")]
    pub port: u16,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Secret key used to sign and verify access tokens.
    #[arg(long, env = "BGR_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// HMAC algorithm for access tokens.
    #[arg(long, value_enum, default_value_t = JwtAlgorithm::Hs256, env = "BGR_JWT_ALGORITHM")]
    pub jwt_algorithm: JwtAlgorithm,

    /// Lifetime of issued tokens in minutes.
    #[arg(long, default_value_t = DEFAULT_TOKEN_EXPIRE_MINUTES, env = "BGR_TOKEN_EXPIRE_MINUTES")]
    pub token_expire_minutes: u32,

    // =========================================================================
    // Upload Configuration
    // =========================================================================
    /// Maximum upload size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE, env = "BGR_MAX_FILE_SIZE")]
    pub max_file_size: u64,

    /// Allowed filename extensions (comma-separated).
    #[arg(
        long,
        env = "BGR_ALLOWED_EXTENSIONS",
        value_delimiter = ',',
        default_value = DEFAULT_EXTENSIONS_ARG
    )]
    pub allowed_extensions: Vec<String>,

    /// Allowed upload content-types (comma-separated).
    #[arg(
        long,
        env = "BGR_ALLOWED_CONTENT_TYPES",
        value_delimiter = ',',
        default_value = DEFAULT_CONTENT_TYPES_ARG
    )]
    pub allowed_content_types: Vec<String>,

    /// Largest accepted image width or height in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_IMAGE_DIMENSION, env = "BGR_MAX_IMAGE_DIMENSION")]
    pub max_image_dimension: u32,

    // =========================================================================
    // Rate Limit Configuration
    // =========================================================================
    /// Requests allowed per identity within one window.
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_REQUESTS, env = "BGR_RATE_LIMIT_REQUESTS")]
    pub rate_limit_requests: usize,

    /// Rate limit window in seconds.
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_WINDOW_SECS, env = "BGR_RATE_LIMIT_WINDOW")]
    pub rate_limit_window: u64,

    // =========================================================================
    // Processing Configuration
    // =========================================================================
    /// Inference deadline in seconds.
    #[arg(long, default_value_t = DEFAULT_INFERENCE_TIMEOUT_SECS, env = "BGR_INFERENCE_TIMEOUT")]
    pub inference_timeout: u64,

    /// JPEG quality for `output_format=jpeg` (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "BGR_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Colour distance below which border-matched pixels become transparent.
    #[arg(long, default_value_t = DEFAULT_MATTE_TOLERANCE, env = "BGR_MATTE_TOLERANCE")]
    pub matte_tolerance: f32,

    /// Width of the alpha ramp above the matte tolerance.
    #[arg(long, default_value_t = DEFAULT_MATTE_FEATHER, env = "BGR_MATTE_FEATHER")]
    pub matte_feather: f32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "BGR_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_secret(self.secret_key.as_deref())?;

        if self.token_expire_minutes == 0 {
            return Err("token_expire_minutes must be greater than 0".to_string());
        }

        if self.max_file_size == 0 {
            return Err("max_file_size must be greater than 0".to_string());
        }
        if self.max_image_dimension == 0 {
            return Err("max_image_dimension must be greater than 0".to_string());
        }
        if self.allowed_extensions.iter().all(|e| e.trim().is_empty()) {
            return Err("allowed_extensions must not be empty".to_string());
        }
        if self.allowed_content_types.iter().all(|c| c.trim().is_empty()) {
            return Err("allowed_content_types must not be empty".to_string());
        }

        if self.rate_limit_requests == 0 {
            return Err("rate_limit_requests must be greater than 0".to_string());
        }
        if self.rate_limit_window == 0 {
            return Err("rate_limit_window must be greater than 0".to_string());
        }
        if self.inference_timeout == 0 {
            return Err("inference_timeout must be greater than 0".to_string());
        }

        // Validate JPEG quality
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if !self.matte_tolerance.is_finite() || self.matte_tolerance < 0.0 {
            return Err("matte_tolerance must be a non-negative number".to_string());
        }
        if !self.matte_feather.is_finite() || self.matte_feather < 0.0 {
            return Err("matte_feather must be a non-negative number".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Token authenticator for this configuration (call validate() first).
    pub fn token_auth(&self) -> TokenAuth {
        TokenAuth::new(self.secret_key.as_deref().unwrap_or(""))
            .with_algorithm(self.jwt_algorithm)
            .with_expiry_minutes(self.token_expire_minutes)
    }

    /// Upload policy for this configuration. Blank list entries are dropped.
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(
            self.max_file_size,
            non_blank(&self.allowed_extensions),
            non_blank(&self.allowed_content_types),
        )
        .with_max_image_dimension(self.max_image_dimension)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout)
    }
}

// =============================================================================
// Token Configuration
// =============================================================================

/// Output format for the `token` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TokenOutputFormat {
    /// Print only the token
    #[default]
    Token,

    /// Print a JSON object like the token endpoint returns
    Json,

    /// Print a ready-to-use `Authorization` header
    Header,
}

/// Configuration for the `token` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TokenConfig {
    /// Identity to issue the token for.
    #[arg(long)]
    pub user_id: String,

    /// Secret key used to sign the token.
    #[arg(long, env = "BGR_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// HMAC algorithm for the token.
    #[arg(long, value_enum, default_value_t = JwtAlgorithm::Hs256, env = "BGR_JWT_ALGORITHM")]
    pub jwt_algorithm: JwtAlgorithm,

    /// Lifetime of the token in minutes.
    #[arg(long, default_value_t = DEFAULT_TOKEN_EXPIRE_MINUTES, env = "BGR_TOKEN_EXPIRE_MINUTES")]
    pub token_expire_minutes: u32,

    /// Output format.
    #[arg(long, value_enum, default_value_t = TokenOutputFormat::Token)]
    pub format: TokenOutputFormat,
}

impl TokenConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_secret(self.secret_key.as_deref())?;

        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        if self.token_expire_minutes == 0 {
            return Err("token_expire_minutes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Token authenticator for this configuration (call validate() first).
    pub fn token_auth(&self) -> TokenAuth {
        TokenAuth::new(self.secret_key.as_deref().unwrap_or(""))
            .with_algorithm(self.jwt_algorithm)
            .with_expiry_minutes(self.token_expire_minutes)
    }
}

fn validate_secret(secret: Option<&str>) -> Result<(), String> {
    match secret {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(
            "No secret key provided. Set --secret-key or BGR_SECRET_KEY to sign access tokens"
                .to_string(),
        ),
    }
}

fn non_blank(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
