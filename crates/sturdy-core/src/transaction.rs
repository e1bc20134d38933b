//! Transaction trait and isolation levels

use crate::{Connection, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Transaction locking behavior requested from the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Let the driver pick its default
    #[default]
    Unspecified,
    /// Pending changes from more highly isolated transactions cannot be overwritten
    Chaos,
    /// Dirty reads are possible
    ReadUncommitted,
    /// Only committed data is read
    ReadCommitted,
    /// Rows read are locked against updates until the transaction ends
    RepeatableRead,
    /// Range locks prevent phantom rows
    Serializable,
    /// Reads see a consistent snapshot taken at transaction start
    Snapshot,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IsolationLevel::Unspecified => "unspecified",
            IsolationLevel::Chaos => "chaos",
            IsolationLevel::ReadUncommitted => "read uncommitted",
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// A database transaction
pub trait Transaction: Send + Sync {
    /// Get the isolation level the transaction runs at
    fn isolation_level(&self) -> IsolationLevel;

    /// Get the connection the transaction belongs to
    fn connection(&self) -> Option<Arc<dyn Connection>>;

    /// Commit the transaction
    fn commit(&self) -> Result<()>;

    /// Rollback the transaction
    fn rollback(&self) -> Result<()>;

    /// Release the resources held by the transaction
    fn dispose(&self) -> Result<()>;

    /// Get the transaction this one decorates, `None` for driver transactions
    fn inner_transaction(&self) -> Option<Arc<dyn Transaction>> {
        None
    }
}
