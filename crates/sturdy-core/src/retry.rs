//! The retry capability proxies submit their operations to
//!
//! A policy decides how many times an operation runs, how long to wait
//! between attempts and which failures are worth another attempt. None of
//! that is visible here: callers hand over a closure and get back either the
//! eventual success or the failure the policy gave up on.

use crate::{Result, SturdyError};
use std::sync::Arc;

/// A retry policy.
///
/// `execute` receives the operation as a closure and may invoke it any number
/// of times. It must return `Ok(())` only after an invocation returned
/// `Ok(())`, and otherwise return the error it gave up on.
///
/// Proxies use the policy through [`RetryPolicyExt`], which adds the
/// value-returning and unit-returning forms on top of this single method.
pub trait RetryPolicy: Send + Sync {
    /// Run `operation` under the policy
    fn execute(&self, operation: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Shared handle to a retry policy, reused across every proxy of a chain
pub type SharedRetryPolicy = Arc<dyn RetryPolicy>;

/// Typed entry points over [`RetryPolicy::execute`]
pub trait RetryPolicyExt: RetryPolicy {
    /// Run a value-returning operation under the policy and return the value
    /// of the successful attempt.
    fn execute_value<T, F>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut value = None;
        self.execute(&mut || -> Result<()> {
            value = Some(operation()?);
            Ok(())
        })?;
        value.ok_or_else(|| {
            SturdyError::Policy("policy reported success without a successful attempt".into())
        })
    }

    /// Run a unit-returning operation under the policy
    fn execute_unit<F>(&self, mut operation: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        self.execute(&mut operation)
    }
}

impl<P: RetryPolicy + ?Sized> RetryPolicyExt for P {}

/// A policy that runs every operation exactly once.
///
/// Useful when a proxy chain is required by the surrounding code but retries
/// are not wanted, e.g. inside an outer retry loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn execute(&self, operation: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        operation()
    }
}
