//! Connection trait and connection state

use crate::{Command, IsolationLevel, Result, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle state reported by a driver connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Closed,
    /// Connected and idle
    Open,
    /// A connect attempt is in progress
    Connecting,
    /// A command is executing
    Executing,
    /// Rows are being fetched
    Fetching,
    /// The link to the server was lost
    Broken,
}

impl ConnectionState {
    /// Check if the state is `Open`
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Open => "open",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Executing => "executing",
            ConnectionState::Fetching => "fetching",
            ConnectionState::Broken => "broken",
        };
        f.write_str(name)
    }
}

/// A database connection
///
/// Connections are shared handles: commands and transactions keep an
/// `Arc<dyn Connection>` back to the connection they run on, so every method
/// takes `&self` and implementations keep their mutable state behind locks.
pub trait Connection: Send + Sync {
    /// Get the connection string used to open the connection
    fn connection_string(&self) -> String;

    /// Replace the connection string. Only meaningful while closed.
    fn set_connection_string(&self, connection_string: &str);

    /// Get the current database name
    fn database(&self) -> String;

    /// Get the server or file the connection points at
    fn data_source(&self) -> String;

    /// Get the server version string
    fn server_version(&self) -> String;

    /// Get the current lifecycle state
    fn state(&self) -> ConnectionState;

    /// Switch the current database
    fn change_database(&self, database: &str) -> Result<()>;

    /// Open the connection
    fn open(&self) -> Result<()>;

    /// Close the connection
    fn close(&self) -> Result<()>;

    /// Begin a transaction at the given isolation level
    fn begin_transaction(&self, isolation_level: IsolationLevel) -> Result<Arc<dyn Transaction>>;

    /// Create a command bound to this connection
    fn create_command(&self) -> Result<Arc<dyn Command>>;

    /// Release the resources held by the connection
    fn dispose(&self) -> Result<()>;

    /// Get the connection this one decorates.
    ///
    /// Plain driver connections return `None`. Decorators return the handle
    /// they forward to, so callers can hand drivers the object they expect.
    fn inner_connection(&self) -> Option<Arc<dyn Connection>> {
        None
    }
}
