//! bgremove-api server binary.
//!
//! `bgremove-api serve` runs the HTTP API; `bgremove-api token` mints an
//! access token offline with the same secret.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bgremove_api::{
    config::{Cli, Command, ServeConfig, TokenConfig, TokenOutputFormat},
    inference::BorderMatteEngine,
    pipeline::RemovalPipeline,
    server::{create_router, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let outcome = match Cli::parse().into_command() {
        Command::Serve(config) => {
            init_logging(config.verbose);
            serve(config).await.map_err(|e| error!("{}", e))
        }
        Command::Token(config) => print_token(&config).map_err(|e| eprintln!("Error: {}", e)),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn serve(config: ServeConfig) -> Result<(), String> {
    config
        .validate()
        .map_err(|e| format!("Configuration error: {}", e))?;

    let pipeline = build_pipeline(&config);
    log_startup(&config, &pipeline);

    let router = create_router(pipeline, build_router_config(&config));
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    info!(address = %addr, "Listening");
    info!("  curl -X POST 'http://{}/auth/token?user_id=<id>'", addr);
    info!(
        "  curl -H 'Authorization: Bearer <token>' -F file=@photo.jpg \
         'http://{}/api/remove-background?output_format=png' -o out.png",
        addr
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

fn log_startup(config: &ServeConfig, pipeline: &RemovalPipeline) {
    info!("bgremove-api v{}", env!("CARGO_PKG_VERSION"));
    info!(
        algorithm = ?config.jwt_algorithm,
        expire_minutes = config.token_expire_minutes,
        "Token settings"
    );
    info!(
        max_mb = %format!("{:.1}", config.max_file_size as f64 / (1024.0 * 1024.0)),
        max_dimension = config.max_image_dimension,
        extensions = %config.allowed_extensions.join(","),
        "Upload limits"
    );
    info!(
        requests = config.rate_limit_requests,
        window_secs = config.rate_limit_window,
        "Rate limit"
    );
    info!(
        engine = pipeline.engine_name(),
        timeout_secs = config.inference_timeout,
        jpeg_quality = config.jpeg_quality,
        "Processing"
    );
}

/// Resolve on Ctrl-C so in-flight requests can finish.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

/// `RUST_LOG` wins; otherwise our crate and tower-http at info (debug with -v).
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default_filter = format!("bgremove_api={level},tower_http={level}");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_pipeline(config: &ServeConfig) -> RemovalPipeline {
    let engine = BorderMatteEngine::new(config.matte_tolerance, config.matte_feather);

    RemovalPipeline::new(config.token_auth(), Arc::new(engine))
        .with_rate_limit(config.rate_limit_requests, config.rate_limit_window())
        .with_upload_policy(config.upload_policy())
        .with_inference_timeout(config.inference_timeout())
        .with_jpeg_quality(config.jpeg_quality)
}

fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let router_config = match &config.cors_origins {
        Some(origins) => RouterConfig::new().with_cors_origins(origins.clone()),
        None => RouterConfig::new(),
    };
    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Token Command
// =============================================================================

fn print_token(config: &TokenConfig) -> Result<(), String> {
    config.validate()?;

    let issued = config
        .token_auth()
        .issue(config.user_id.trim())
        .map_err(|e| e.to_string())?;

    match config.format {
        TokenOutputFormat::Token => println!("{}", issued.token),
        TokenOutputFormat::Header => println!("Authorization: Bearer {}", issued.token),
        TokenOutputFormat::Json => {
            let body = serde_json::json!({
                "access_token": issued.token,
                "token_type": "bearer",
                "expires_in": issued.expires_in(),
                "sub": issued.claims.sub,
                "exp": issued.claims.exp,
            });
            let text = serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?;
            println!("{}", text);
        }
    }

    Ok(())
}
