//! Turnstile - Admission Control for Site Mutations
//!
//! This crate implements a per-key fixed-window rate limiter that gates the
//! mutating endpoints of a donation site's admin surface: content edits,
//! program and team changes, manual donation entries, donor emails and
//! settings. State is held in process memory; each process enforces its
//! own quota.

pub mod config;
pub mod error;
pub mod guard;
pub mod policy;
pub mod ratelimit;

pub use error::{Rejection, Result, TurnstileError};
pub use guard::AdmissionGuard;
pub use policy::{Action, ActionPolicy, PolicyTable};
pub use ratelimit::{Decision, RateLimiter};
