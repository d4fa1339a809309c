//! Core fixed-window rate limiter.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::entry::RateLimitEntry;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Further calls permitted for this key in the current window
    pub remaining: u64,
    /// Time until the key's current window closes
    pub resets_in: Duration,
}

impl Decision {
    fn admitted(remaining: u64, resets_in: Duration) -> Self {
        Self {
            allowed: true,
            remaining,
            resets_in,
        }
    }

    fn denied(resets_in: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            resets_in,
        }
    }
}

/// Per-key fixed-window admission counter.
///
/// Every check runs inside one critical section with no suspension point,
/// so calls for the same key are linearizable. State is local to this
/// instance: separate processes each enforce their own quota.
///
/// When bounded, the least recently checked key is evicted to make room for
/// a new one. Denied checks count as use, so a key being throttled stays
/// tracked for as long as it keeps calling.
pub struct RateLimiter {
    /// Window state indexed by caller-supplied key, in recency order
    entries: Mutex<LruCache<String, RateLimitEntry>>,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Upper bound on tracked keys, 0 for unbounded
    max_entries: usize,
}

impl RateLimiter {
    /// Create an unbounded rate limiter on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an unbounded rate limiter on the given clock.
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            clock: Arc::new(clock),
            max_entries: 0,
        }
    }

    /// Bound the number of tracked keys. `0` disables the bound.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MAX);
        self.entries.get_mut().resize(cap);
        self.max_entries = max_entries;
        self
    }

    /// Decide whether a call for `key` fits within `limit` calls per `window`.
    ///
    /// Denied calls do not consume quota. A zero `limit`, a window shorter
    /// than one millisecond, or an empty key is treated as misuse and
    /// denied outright without touching any state.
    pub fn check_limit(&self, key: &str, limit: u64, window: Duration) -> Decision {
        let window_ms = window.as_millis().min(u64::MAX as u128) as u64;
        if key.is_empty() || limit == 0 || window_ms == 0 {
            debug!(
                key = %key,
                limit = limit,
                window_ms = window_ms,
                "Denying misconfigured rate limit check"
            );
            return Decision::denied(Duration::ZERO);
        }

        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired(now) {
                *entry = RateLimitEntry::open(now, window_ms);
                trace!(key = %key, limit = limit, "Window restarted");
                return Decision::admitted(limit - 1, entry.resets_in(now));
            }

            if entry.count >= limit {
                debug!(
                    key = %key,
                    count = entry.count,
                    limit = limit,
                    "Rate limit exceeded"
                );
                return Decision::denied(entry.resets_in(now));
            }

            entry.count += 1;
            trace!(key = %key, count = entry.count, limit = limit, "Call admitted");
            return Decision::admitted(limit - entry.count, entry.resets_in(now));
        }

        let entry = RateLimitEntry::open(now, window_ms);
        if let Some((evicted, _)) = entries.push(key.to_owned(), entry) {
            debug!(key = %evicted, "Evicted least recently checked key at capacity");
        }
        trace!(key = %key, limit = limit, window_ms = window_ms, "Window opened");
        Decision::admitted(limit - 1, entry.resets_in(now))
    }

    /// Drop every entry whose window has closed. Returns how many were removed.
    ///
    /// Walks the whole table; meant for the background sweeper, not the
    /// request path.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Forget all keys.
    ///
    /// This is primarily useful for testing.
    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    /// Snapshot of the state tracked for `key`, if any. Does not count as use.
    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.lock().peek(key).copied()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured key bound, 0 when unbounded.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
