use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;

use crate::error::InferenceError;
use crate::upload::DecodedImage;

/// Default inference deadline in seconds.
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 120;

/// Output of a background-removal engine.
///
/// The alpha channel is the foreground mask.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    image: RgbaImage,
}

impl ProcessedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// A background-removal engine.
///
/// Implementations receive an image that already passed upload validation
/// and must return an RGBA image of identical dimensions. CPU-bound engines
/// should move their work onto the blocking pool
/// (`tokio::task::spawn_blocking`) so other requests keep being served.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Remove the background from `image`.
    async fn remove_background(&self, image: DecodedImage)
        -> Result<ProcessedImage, InferenceError>;

    /// Short name reported by the health endpoint.
    fn name(&self) -> &str;
}

// =============================================================================
// Inference Invoker
// =============================================================================

/// Runs an engine under a deadline and checks its output contract.
#[derive(Clone)]
pub struct InferenceInvoker {
    engine: Arc<dyn InferenceEngine>,
    deadline: Duration,
}

impl InferenceInvoker {
    pub fn new(engine: Arc<dyn InferenceEngine>, deadline: Duration) -> Self {
        Self { engine, deadline }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> Arc<dyn InferenceEngine> {
        Arc::clone(&self.engine)
    }

    /// Name of the wrapped engine.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run the engine on `image`.
    ///
    /// # Errors
    ///
    /// - [`InferenceError::Timeout`] if the engine does not answer in time
    /// - [`InferenceError::DimensionMismatch`] if it returns a differently
    ///   sized image
    /// - whatever the engine itself reports
    pub async fn invoke(&self, image: DecodedImage) -> Result<ProcessedImage, InferenceError> {
        let (expected_width, expected_height) = (image.width(), image.height());

        let processed = tokio::time::timeout(self.deadline, self.engine.remove_background(image))
            .await
            .map_err(|_| InferenceError::Timeout(self.deadline))??;

        if processed.width() != expected_width || processed.height() != expected_height {
            return Err(InferenceError::DimensionMismatch {
                expected_width,
                expected_height,
                actual_width: processed.width(),
                actual_height: processed.height(),
            });
        }

        Ok(processed)
    }
}

impl std::fmt::Debug for InferenceInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceInvoker")
            .field("engine", &self.engine.name())
            .field("deadline", &self.deadline)
            .finish()
    }
}
