//! Wrap/unwrap helpers shared by the proxies
//!
//! Drivers only accept their own objects, so anything a caller hands to a
//! proxy goes through these before reaching the driver. A proxy's
//! `inner_*` capability reports the handle it decorates; plain driver
//! objects report `None` and pass through unchanged.

use std::sync::Arc;
use sturdy_core::{Command, Connection, Transaction};

/// Get the driver connection behind `connection`
pub fn raw_connection(connection: Arc<dyn Connection>) -> Arc<dyn Connection> {
    connection.inner_connection().unwrap_or(connection)
}

/// Get the driver command behind `command`
pub fn raw_command(command: Arc<dyn Command>) -> Arc<dyn Command> {
    command.inner_command().unwrap_or(command)
}

/// Get the driver transaction behind `transaction`
pub fn raw_transaction(transaction: Arc<dyn Transaction>) -> Arc<dyn Transaction> {
    transaction.inner_transaction().unwrap_or(transaction)
}

/// Check whether two handles point at the same object
pub(crate) fn same_object<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
