//! # Resilience Module
//!
//! Pacing and admission control used by background jobs:
//!
//! - **ConstantRateLimiter**: spaces recurring work to a maximum rate
//! - **RateLimitingTtlCache**: admits a key at most once per time window
//! - **ConditionLimiter**: serializes an expensive predicate and bounds how
//!   many identifiers may satisfy it at once

pub mod condition_limiter;
pub mod rate_limiter;
pub mod ttl_cache;

pub use condition_limiter::{Condition, ConditionLimiter, FnCondition, LimiterError, NoCondition};
pub use rate_limiter::ConstantRateLimiter;
pub use ttl_cache::RateLimitingTtlCache;
