//! Admission backend trait.

use std::time::Duration;

use super::limiter::{Decision, RateLimiter};

/// Anything that can answer a fixed-window admission check.
///
/// The in-process [`RateLimiter`] is the only implementation here; a shared
/// store behind the same trait would give a cross-process quota.
pub trait AdmissionBackend: Send + Sync {
    /// Decide whether a call for `key` fits within `limit` calls per `window`.
    fn check_limit(&self, key: &str, limit: u64, window: Duration) -> Decision;
}

impl AdmissionBackend for RateLimiter {
    fn check_limit(&self, key: &str, limit: u64, window: Duration) -> Decision {
        RateLimiter::check_limit(self, key, limit, window)
    }
}
