//! Error types for the Turnstile admission controller.

use std::time::Duration;

use thiserror::Error;

use crate::policy::Action;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Policy file parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for TurnstileError {
    fn from(err: ::config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

/// Why a guarded mutation was turned away.
///
/// These are outcomes, not faults: the caller maps them onto its own
/// response at the API boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The caller exhausted its quota for this action in the current window.
    #[error("too many {action} requests, retry in {}ms", .retry_after.as_millis())]
    RateLimited { action: Action, retry_after: Duration },

    /// No caller identity was supplied to build a key from.
    #[error("missing caller identity for {action}")]
    MissingSubject { action: Action },
}

impl Rejection {
    /// HTTP status a web handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Rejection::RateLimited { .. } => 429,
            Rejection::MissingSubject { .. } => 400,
        }
    }

    /// Whether this is a quota denial, as opposed to a malformed request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Rejection::RateLimited { .. })
    }

    /// Suggested backoff, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Rejection::RateLimited { retry_after, .. } => Some(*retry_after),
            Rejection::MissingSubject { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_distinct_from_validation() {
        let limited = Rejection::RateLimited {
            action: Action::LogDonation,
            retry_after: Duration::from_millis(1500),
        };
        let missing = Rejection::MissingSubject {
            action: Action::LogDonation,
        };

        assert_eq!(limited.http_status(), 429);
        assert_eq!(missing.http_status(), 400);
        assert!(limited.is_rate_limited());
        assert!(!missing.is_rate_limited());
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(missing.retry_after(), None);
    }

    #[test]
    fn test_rejection_messages() {
        let limited = Rejection::RateLimited {
            action: Action::SendDonorEmail,
            retry_after: Duration::from_millis(250),
        };
        assert_eq!(
            limited.to_string(),
            "too many send_donor_email requests, retry in 250ms"
        );
    }
}
