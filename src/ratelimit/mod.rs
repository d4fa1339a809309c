//! Fixed-window admission control and its state.

mod backend;
mod clock;
mod entry;
mod key;
mod limiter;
mod sweeper;

pub use backend::AdmissionBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::RateLimitEntry;
pub use key::AdmissionKey;
pub use limiter::{Decision, RateLimiter};
pub use sweeper::{spawn_sweeper, SweeperHandle};
