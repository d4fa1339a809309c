//! Admission guard for mutating endpoints.
//!
//! A route handler calls [`AdmissionGuard::admit`] before it performs its
//! write and turns a [`Rejection`] into its own error response.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::Rejection;
use crate::policy::{Action, PolicyTable};
use crate::ratelimit::{AdmissionBackend, AdmissionKey, Decision, RateLimiter};

/// Applies per-action policies on top of an admission backend.
pub struct AdmissionGuard<B: AdmissionBackend = RateLimiter> {
    /// The backend holding window state
    backend: Arc<B>,
    /// Limit and window for each action
    policies: PolicyTable,
}

impl<B: AdmissionBackend> AdmissionGuard<B> {
    /// Create a new guard over the given backend.
    pub fn new(backend: Arc<B>, policies: PolicyTable) -> Self {
        Self { backend, policies }
    }

    /// Check whether `subject` may perform `action` now.
    ///
    /// On success the returned decision tells the caller how much quota is
    /// left. A missing subject is rejected before any quota is consulted.
    #[instrument(skip_all, fields(action = %action))]
    pub fn admit(&self, action: Action, subject: &str) -> Result<Decision, Rejection> {
        let subject = subject.trim();
        if subject.is_empty() {
            warn!("Admission check without caller identity");
            return Err(Rejection::MissingSubject { action });
        }

        let policy = self.policies.get(action);
        let key = AdmissionKey::new(action, subject);
        let decision = self
            .backend
            .check_limit(&key.to_string_key(), policy.limit, policy.window);

        if !decision.allowed {
            debug!(key = %key, limit = policy.limit, "Admission denied");
            return Err(Rejection::RateLimited {
                action,
                retry_after: decision.resets_in,
            });
        }

        debug!(key = %key, remaining = decision.remaining, "Admission granted");
        Ok(decision)
    }

    /// The policies this guard enforces.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// The backend this guard consults.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ActionPolicy;
    use crate::ratelimit::ManualClock;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    /// Records what the guard asked for and always denies.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(String, u64, Duration)>>,
    }

    impl AdmissionBackend for RecordingBackend {
        fn check_limit(&self, key: &str, limit: u64, window: Duration) -> Decision {
            self.calls.lock().push((key.to_string(), limit, window));
            Decision {
                allowed: false,
                remaining: 0,
                resets_in: Duration::from_millis(750),
            }
        }
    }

    fn guard_with_clock() -> (AdmissionGuard, ManualClock) {
        let clock = ManualClock::new(0);
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        let mut policies = PolicyTable::defaults();
        policies.set(
            Action::SendDonorEmail,
            ActionPolicy::new(2, Duration::from_secs(10)),
        );
        (AdmissionGuard::new(limiter, policies), clock)
    }

    #[test]
    fn test_admit_within_quota() {
        let (guard, _) = guard_with_clock();

        let decision = assert_ok!(guard.admit(Action::SendDonorEmail, "user-1"));
        assert_eq!(decision.remaining, 1);
        assert_ok!(guard.admit(Action::SendDonorEmail, "user-1"));
    }

    #[test]
    fn test_reject_over_quota_with_retry_hint() {
        let (guard, clock) = guard_with_clock();

        guard.admit(Action::SendDonorEmail, "user-1").unwrap();
        guard.admit(Action::SendDonorEmail, "user-1").unwrap();
        clock.set(4_000);

        let rejection = assert_err!(guard.admit(Action::SendDonorEmail, "user-1"));
        assert_eq!(
            rejection,
            Rejection::RateLimited {
                action: Action::SendDonorEmail,
                retry_after: Duration::from_secs(6),
            }
        );
        assert_eq!(rejection.http_status(), 429);
    }

    #[test]
    fn test_quotas_are_scoped_per_action() {
        let (guard, _) = guard_with_clock();

        guard.admit(Action::SendDonorEmail, "user-1").unwrap();
        guard.admit(Action::SendDonorEmail, "user-1").unwrap();
        assert_err!(guard.admit(Action::SendDonorEmail, "user-1"));

        assert_ok!(guard.admit(Action::LogDonation, "user-1"));
        assert_ok!(guard.admit(Action::SendDonorEmail, "user-2"));
    }

    #[test]
    fn test_missing_subject_rejected_before_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let guard = AdmissionGuard::new(backend.clone(), PolicyTable::defaults());

        let rejection = assert_err!(guard.admit(Action::UpdateSettings, "   "));
        assert_eq!(
            rejection,
            Rejection::MissingSubject {
                action: Action::UpdateSettings
            }
        );
        assert!(backend.calls.lock().is_empty());
    }

    #[test]
    fn test_guard_passes_policy_to_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let guard = AdmissionGuard::new(backend.clone(), PolicyTable::defaults());

        let rejection = assert_err!(guard.admit(Action::CreateProgram, " admin@example.org "));
        assert_eq!(rejection.retry_after(), Some(Duration::from_millis(750)));

        let calls = backend.calls.lock();
        assert_eq!(
            calls.as_slice(),
            &[(
                "create_program:admin@example.org".to_string(),
                10,
                Duration::from_secs(60)
            )]
        );
    }
}
