//! Background-removal engines and the invoker that guards them.
//!
//! The engine itself is a collaborator: anything implementing
//! [`InferenceEngine`] can be plugged in. [`InferenceInvoker`] wraps an engine
//! with a deadline and checks that the returned image has the same dimensions
//! as its input.
//!
//! [`BorderMatteEngine`] is the built-in engine. It keys out the colour found
//! along the image border, which is enough to run the service end-to-end
//! without a model.

mod engine;
mod matte;

pub use engine::{
    InferenceEngine, InferenceInvoker, ProcessedImage, DEFAULT_INFERENCE_TIMEOUT_SECS,
};
pub use matte::{BorderMatteEngine, DEFAULT_MATTE_FEATHER, DEFAULT_MATTE_TOLERANCE};
