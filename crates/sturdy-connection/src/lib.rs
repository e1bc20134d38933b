//! Sturdy Connection - Retrying proxies over database drivers
//!
//! This crate wraps a driver's connection, command and transaction objects
//! in proxies that expose the same contracts, routing every operation that
//! can fail transiently through a caller-supplied retry policy.

pub mod proxy;

pub use proxy::{CommandProxy, ConnectionProxy, TransactionProxy};
pub use sturdy_core::{NoRetry, RetryPolicy, RetryPolicyExt, SharedRetryPolicy};
