//! # Condition Limiter
//!
//! Bounds how many identifiers may hold a satisfied, expensive predicate at
//! the same time and caches the positive outcome per identifier.
//!
//! All evaluations are serialized behind one lock that is held while the
//! predicate runs, so two callers never evaluate it concurrently, even for
//! different identifiers. Once an identifier is active it is never
//! re-evaluated until [`ConditionLimiter::remove`] frees it.
//!
//! ```rust
//! use dbm_async_core::resilience::{ConditionLimiter, FnCondition};
//!
//! let limiter = ConditionLimiter::new(FnCondition::new(|_: &()| true));
//! assert!(limiter.check_condition("foo", &()).unwrap());
//! assert!(limiter.limit_reached());
//! assert!(!limiter.check_condition("bar", &()).unwrap());
//! limiter.remove("foo");
//! assert!(limiter.check_condition("baz", &()).unwrap());
//! ```

use std::collections::HashSet;
use std::marker::PhantomData;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::constants::defaults;

#[derive(Debug, Error)]
pub enum LimiterError {
    /// The limiter has no predicate to evaluate
    #[error("Condition is not implemented for this limiter")]
    NotSupported,

    #[error("Condition evaluation failed: {0}")]
    Predicate(#[from] anyhow::Error),
}

/// The predicate guarded by a [`ConditionLimiter`].
pub trait Condition: Send + Sync {
    type Args: ?Sized;

    /// Evaluate the predicate. Implementations must override this.
    fn condition(&self, _args: &Self::Args) -> Result<bool, LimiterError> {
        Err(LimiterError::NotSupported)
    }
}

/// A limiter without a predicate. Every evaluation fails with
/// [`LimiterError::NotSupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCondition;

impl Condition for NoCondition {
    type Args = ();
}

/// Adapts an infallible closure into a [`Condition`]
pub struct FnCondition<F, A: ?Sized> {
    predicate: F,
    _args: PhantomData<fn(&A)>,
}

impl<F, A: ?Sized> FnCondition<F, A>
where
    F: Fn(&A) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _args: PhantomData,
        }
    }
}

impl<F, A: ?Sized> Condition for FnCondition<F, A>
where
    F: Fn(&A) -> bool + Send + Sync,
{
    type Args = A;

    fn condition(&self, args: &A) -> Result<bool, LimiterError> {
        Ok((self.predicate)(args))
    }
}

pub struct ConditionLimiter<C: Condition> {
    condition: C,
    limit: usize,
    active: Mutex<HashSet<String>>,
}

impl Default for ConditionLimiter<NoCondition> {
    fn default() -> Self {
        Self::new(NoCondition)
    }
}

impl<C: Condition> ConditionLimiter<C> {
    /// Create a limiter allowing a single active identifier
    pub fn new(condition: C) -> Self {
        Self::with_limit(condition, defaults::CONDITION_LIMIT)
    }

    /// Create a limiter allowing `limit` active identifiers (at least one)
    pub fn with_limit(condition: C, limit: usize) -> Self {
        Self {
            condition,
            limit: limit.max(1),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Check whether `identifier` satisfies the condition.
    ///
    /// Active identifiers return true without evaluating. When the active set
    /// is full, other identifiers return false without evaluating. Otherwise
    /// the predicate runs under the lock and a true result activates the
    /// identifier. Predicate errors propagate and leave the set unchanged.
    pub fn check_condition(&self, identifier: &str, args: &C::Args) -> Result<bool, LimiterError> {
        let mut active = self.active.lock();

        if active.contains(identifier) {
            trace!(identifier = %identifier, "Condition cached as active");
            return Ok(true);
        }
        if active.len() >= self.limit {
            trace!(
                identifier = %identifier,
                limit = self.limit,
                "Condition limit reached, skipping evaluation"
            );
            return Ok(false);
        }

        let satisfied = self.condition.condition(args)?;
        if satisfied {
            active.insert(identifier.to_string());
            debug!(
                identifier = %identifier,
                active_count = active.len(),
                limit = self.limit,
                "Condition satisfied, identifier activated"
            );
        }
        Ok(satisfied)
    }

    /// Free the slot held by `identifier`, if any
    pub fn remove(&self, identifier: &str) {
        if self.active.lock().remove(identifier) {
            debug!(identifier = %identifier, "Condition identifier released");
        }
    }

    pub fn limit_reached(&self) -> bool {
        self.active.lock().len() == self.limit
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_active(&self, identifier: &str) -> bool {
        self.active.lock().contains(identifier)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
