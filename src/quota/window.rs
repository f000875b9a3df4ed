//! Sliding-window request counter keyed by identity.
//!
//! # Locking
//!
//! The tracker holds two levels of locks:
//!
//! - an outer `RwLock` over the identity map, held only long enough to look
//!   up (or insert) an identity's record
//! - one `Mutex` per identity, held across the whole
//!   read → prune → compare → append sequence
//!
//! Two concurrent requests for the same identity therefore cannot both see
//! the last free slot, while requests for different identities never wait on
//! each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

/// Default number of requests allowed per window.
pub const DEFAULT_RATE_LIMIT_REQUESTS: usize = 100;

/// Default window length in seconds (1 hour).
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 3600;

/// Admitted request times for one identity, oldest first.
type RateRecord = Arc<Mutex<VecDeque<Instant>>>;

// =============================================================================
// Decision
// =============================================================================

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was recorded against the identity's quota.
    Admitted {
        /// Requests still available in the current window
        remaining: usize,
    },

    /// The identity has no quota left; nothing was recorded.
    Rejected {
        /// Time until the oldest recorded request leaves the window
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

// =============================================================================
// Rate Window Tracker
// =============================================================================

/// Sliding-window rate limiter keyed by identity.
///
/// State lives for as long as the tracker does; stale timestamps are pruned
/// lazily on the next check for the same identity.
pub struct RateWindowTracker {
    records: RwLock<HashMap<String, RateRecord>>,
    max_requests: usize,
    window: Duration,
}

impl RateWindowTracker {
    /// Create a tracker allowing `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject a request for `identity` at time `now`.
    ///
    /// Returns `true` and records the request when the identity has quota
    /// left, `false` otherwise.
    pub async fn admit(&self, identity: &str, now: Instant) -> bool {
        self.check(identity, now).await.is_admitted()
    }

    /// Like [`admit`](Self::admit), but reports remaining quota or wait time.
    ///
    /// A `now` earlier than the identity's latest recorded request is
    /// recorded at that latest time, so the record stays ordered.
    pub async fn check(&self, identity: &str, now: Instant) -> Decision {
        let record = self.record_for(identity).await;
        let mut timestamps = record.lock().await;
        self.decide(&mut timestamps, now)
    }

    /// Check `identity` against the clock read after its record is locked.
    ///
    /// Concurrent callers for one identity are therefore recorded in the
    /// order they were admitted.
    pub async fn check_now(&self, identity: &str) -> Decision {
        let record = self.record_for(identity).await;
        let mut timestamps = record.lock().await;
        self.decide(&mut timestamps, Instant::now())
    }

    fn decide(&self, timestamps: &mut VecDeque<Instant>, now: Instant) -> Decision {
        let now = timestamps.back().map_or(now, |latest| now.max(*latest));

        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            let retry_after = timestamps
                .front()
                .map(|oldest| {
                    self.window
                        .saturating_sub(now.saturating_duration_since(*oldest))
                })
                .unwrap_or(self.window);
            return Decision::Rejected { retry_after };
        }

        timestamps.push_back(now);
        Decision::Admitted {
            remaining: self.max_requests - timestamps.len(),
        }
    }

    /// Number of requests currently counted against `identity`.
    ///
    /// Does not prune, so it may include timestamps that have already aged
    /// out of the window.
    pub async fn recorded(&self, identity: &str) -> usize {
        let records = self.records.read().await;
        match records.get(identity) {
            Some(record) => record.lock().await.len(),
            None => 0,
        }
    }

    /// Fetch the record for `identity`, creating an empty one if needed.
    async fn record_for(&self, identity: &str) -> RateRecord {
        if let Some(record) = self.records.read().await.get(identity) {
            return Arc::clone(record);
        }

        let mut records = self.records.write().await;
        Arc::clone(
            records
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new()))),
        )
    }
}

impl Default for RateWindowTracker {
    fn default() -> Self {
        Self::new(
            DEFAULT_RATE_LIMIT_REQUESTS,
            Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
