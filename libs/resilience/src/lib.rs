//! Backpressure primitives protecting the inventory write path.
//!
//! All admission checks here are fast-fail: a rejected request receives a
//! typed error with a retry hint and never enters the critical path.

pub mod bulkhead;
pub mod circuit;
pub mod rate_limit;
pub mod shed;

pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use circuit::{CircuitBreaker, CircuitSettings};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use shed::LoadShedder;
