//! Per-identity request quotas.
//!
//! Every authenticated identity may make at most `max_requests` background
//! removal requests within any sliding window of `window` length.
//!
//! ```text
//!            window (e.g. 3600s)
//!   ├───────────────────────────────┤
//!   ──x────x──x───────x─────x───────● now
//!     │                             │
//!   pruned                   admitted if fewer than
//!                            max_requests remain
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use bgremove_api::quota::RateWindowTracker;
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracker = RateWindowTracker::new(2, Duration::from_secs(60));
//!     let now = Instant::now();
//!
//!     assert!(tracker.admit("u1", now).await);
//!     assert!(tracker.admit("u1", now).await);
//!     assert!(!tracker.admit("u1", now).await);
//! }
//! ```

mod window;

pub use window::{
    Decision, RateWindowTracker, DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
};
