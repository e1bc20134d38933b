//! Sturdy Core - Driver contracts for the sturdy resilience layer
//!
//! This crate provides the traits and types that database drivers and the
//! retrying proxies in `sturdy-connection` both program against. It defines:
//!
//! - `Connection`, `Command`, `Transaction` - Capability interfaces for driver objects
//! - `DataReader` - Forward-only result cursor returned by commands
//! - `RetryPolicy` - The retry capability proxies submit their operations to
//! - Common types like `Value`, `Parameter`, `IsolationLevel`, etc.

mod command;
mod connection;
mod error;
mod parameter;
mod retry;
mod transaction;
mod types;

pub use command::*;
pub use connection::*;
pub use error::*;
pub use parameter::*;
pub use retry::*;
pub use transaction::*;
pub use types::*;
