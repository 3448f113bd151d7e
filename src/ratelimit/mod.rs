//! Rate limiting logic and state management.

mod client_key;
mod clock;
mod limiter;
mod policy;
mod sweeper;
mod window;

pub use client_key::{
    client_key_from_header, extract_client_key, scoped_key, validate_scope, FORWARDED_FOR, SCOPE_SEPARATOR,
    UNKNOWN_CLIENT,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use policy::{PolicyConfig, PolicySet};
pub use sweeper::spawn_sweeper;
pub use window::{Admission, Quota, RateWindow};
