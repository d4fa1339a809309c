//! Admission key generation.

use std::fmt;

use crate::policy::Action;

/// A key that scopes a quota to one caller performing one action.
///
/// Including the action keeps a caller's quota for one route from bleeding
/// into another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdmissionKey {
    /// The action being performed
    pub action: Action,
    /// Caller identity: a user id, session id, or client IP
    pub subject: String,
}

impl AdmissionKey {
    /// Create a new admission key.
    pub fn new(action: Action, subject: impl Into<String>) -> Self {
        Self {
            action,
            subject: subject.into(),
        }
    }

    /// The string form used as the limiter key.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.action, self.subject)
    }
}

impl fmt::Display for AdmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
