//! Colour-keying engine that needs no model.
//!
//! The background colour is estimated as the mean of every pixel on the image
//! border. Each pixel's alpha then ramps from 0 to 255 with its Euclidean RGB
//! distance from that colour:
//!
//! ```text
//!   alpha
//!   255 ┤            ┌──────────
//!       │           /
//!       │          /
//!     0 ┼─────────┘
//!       0     tolerance   tolerance + feather      distance
//! ```
//!
//! Pixels that were already transparent stay transparent.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::error::InferenceError;
use crate::upload::DecodedImage;

use super::engine::{InferenceEngine, ProcessedImage};

/// Default distance below which a pixel counts as background.
pub const DEFAULT_MATTE_TOLERANCE: f32 = 48.0;

/// Default width of the alpha ramp above the tolerance.
pub const DEFAULT_MATTE_FEATHER: f32 = 32.0;

/// Border-keyed matte engine.
#[derive(Debug, Clone, Copy)]
pub struct BorderMatteEngine {
    tolerance: f32,
    feather: f32,
}

impl BorderMatteEngine {
    /// Create an engine. Negative values are treated as zero.
    pub fn new(tolerance: f32, feather: f32) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
            feather: feather.max(0.0),
        }
    }

    /// Apply the matte synchronously.
    pub fn matte(&self, mut image: RgbaImage) -> RgbaImage {
        let Some(background) = border_mean(&image) else {
            return image;
        };

        for pixel in image.pixels_mut() {
            let key = self.alpha_for(distance(pixel, background));
            pixel[3] = pixel[3].min(key);
        }
        image
    }

    fn alpha_for(&self, distance: f32) -> u8 {
        if distance <= self.tolerance {
            return 0;
        }
        if self.feather == 0.0 {
            return 255;
        }
        let t = ((distance - self.tolerance) / self.feather).min(1.0);
        (t * 255.0).round() as u8
    }
}

impl Default for BorderMatteEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MATTE_TOLERANCE, DEFAULT_MATTE_FEATHER)
    }
}

#[async_trait]
impl InferenceEngine for BorderMatteEngine {
    async fn remove_background(
        &self,
        image: DecodedImage,
    ) -> Result<ProcessedImage, InferenceError> {
        let engine = *self;
        let rgba = tokio::task::spawn_blocking(move || engine.matte(image.into_image().to_rgba8()))
            .await
            .map_err(|e| InferenceError::Engine(format!("matte task failed: {}", e)))?;
        Ok(ProcessedImage::new(rgba))
    }

    fn name(&self) -> &str {
        "border-matte"
    }
}

/// Mean RGB of the border pixels, or `None` for an empty image.
fn border_mean(image: &RgbaImage) -> Option<[f32; 3]> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let mut sum = [0f64; 3];
    let mut count = 0u64;
    let mut add = |p: &Rgba<u8>| {
        for c in 0..3 {
            sum[c] += p[c] as f64;
        }
        count += 1;
    };

    for x in 0..width {
        add(image.get_pixel(x, 0));
        if height > 1 {
            add(image.get_pixel(x, height - 1));
        }
    }
    for y in 1..height.saturating_sub(1) {
        add(image.get_pixel(0, y));
        if width > 1 {
            add(image.get_pixel(width - 1, y));
        }
    }

    let n = count as f64;
    Some([
        (sum[0] / n) as f32,
        (sum[1] / n) as f32,
        (sum[2] / n) as f32,
    ])
}

fn distance(pixel: &Rgba<u8>, background: [f32; 3]) -> f32 {
    let dr = pixel[0] as f32 - background[0];
    let dg = pixel[1] as f32 - background[1];
    let db = pixel[2] as f32 - background[2];
    (dr * dr + dg * dg + db * db).sqrt()
}
