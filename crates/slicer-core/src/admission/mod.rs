//! Two admission gates run in series in front of the slicing pipeline: a
//! per-IP fixed-window rate limiter, then a bounded queue in front of the
//! fixed-size worker pool.

mod queue;
mod rate_limiter;

pub use queue::{SliceQueue, SliceQueuePermit};
pub use rate_limiter::{client_key, RateLimitDecision, RateLimiter};
