//! Command trait, command options and result readers

use crate::{Connection, Parameter, ParameterCollection, Result, Transaction, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the command text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandType {
    /// A SQL statement
    #[default]
    Text,
    /// The name of a stored procedure
    StoredProcedure,
    /// The name of a table whose rows are all returned
    TableDirect,
}

/// How command results are applied back to a source row after an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdateRowSource {
    /// Returned parameters and rows are ignored
    None,
    /// Output parameters are mapped to the changed row
    OutputParameters,
    /// The first returned row is mapped to the changed row
    FirstReturnedRecord,
    /// Both output parameters and the first returned row are mapped
    #[default]
    Both,
}

bitflags::bitflags! {
    /// Hints passed to the driver when executing a reader
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandBehavior: u32 {
        /// The query returns a single result set
        const SINGLE_RESULT = 0x01;
        /// Only column information is returned
        const SCHEMA_ONLY = 0x02;
        /// Column and primary key information is returned
        const KEY_INFO = 0x04;
        /// The query returns a single row
        const SINGLE_ROW = 0x08;
        /// Rows are read sequentially, columns in order
        const SEQUENTIAL_ACCESS = 0x10;
        /// Closing the reader closes the connection
        const CLOSE_CONNECTION = 0x20;
    }
}

/// A forward-only cursor over the rows returned by a command
pub trait DataReader: Send {
    /// Number of columns in the current row
    fn field_count(&self) -> usize;

    /// Advance to the next row, returning false past the last row
    fn read(&mut self) -> Result<bool>;

    /// Get the value of a column in the current row
    fn get(&self, ordinal: usize) -> Result<Value>;

    /// Advance to the next result set, returning false past the last one
    fn next_result(&mut self) -> Result<bool>;

    /// Close the reader
    fn close(&mut self) -> Result<()>;
}

/// A SQL statement or stored procedure to run against a connection
pub trait Command: Send + Sync {
    /// Get the statement text
    fn command_text(&self) -> String;

    /// Set the statement text
    fn set_command_text(&self, text: &str);

    /// Get the execution timeout in seconds (0 = no limit)
    fn command_timeout(&self) -> u32;

    /// Set the execution timeout in seconds
    fn set_command_timeout(&self, seconds: u32);

    /// Get how the command text is interpreted
    fn command_type(&self) -> CommandType;

    /// Set how the command text is interpreted
    fn set_command_type(&self, command_type: CommandType);

    /// Whether the command is shown in designer tooling
    fn design_time_visible(&self) -> bool;

    /// Set whether the command is shown in designer tooling
    fn set_design_time_visible(&self, visible: bool);

    /// Get how results are applied back to a source row
    fn updated_row_source(&self) -> UpdateRowSource;

    /// Set how results are applied back to a source row
    fn set_updated_row_source(&self, source: UpdateRowSource);

    /// Get the connection the command runs on
    fn connection(&self) -> Option<Arc<dyn Connection>>;

    /// Set the connection the command runs on
    fn set_connection(&self, connection: Option<Arc<dyn Connection>>);

    /// Get the command's parameters
    fn parameters(&self) -> ParameterCollection;

    /// Get the transaction the command is enlisted in
    fn transaction(&self) -> Option<Arc<dyn Transaction>>;

    /// Enlist the command in a transaction
    fn set_transaction(&self, transaction: Option<Arc<dyn Transaction>>);

    /// Attempt to cancel the running execution
    fn cancel(&self) -> Result<()>;

    /// Execute a statement and return the number of rows affected
    fn execute_non_query(&self) -> Result<i64>;

    /// Execute a query and return the first column of the first row
    fn execute_scalar(&self) -> Result<Value>;

    /// Create a prepared version of the command on the server
    fn prepare(&self) -> Result<()>;

    /// Create a new parameter for this command
    fn create_parameter(&self) -> Parameter;

    /// Execute a query and return a reader over its rows
    fn execute_reader(&self, behavior: CommandBehavior) -> Result<Box<dyn DataReader>>;

    /// Release the resources held by the command
    fn dispose(&self) -> Result<()>;

    /// Get the command this one decorates, `None` for driver commands
    fn inner_command(&self) -> Option<Arc<dyn Command>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_behavior_flags() {
        let behavior = CommandBehavior::SINGLE_ROW | CommandBehavior::KEY_INFO;
        assert!(behavior.contains(CommandBehavior::SINGLE_ROW));
        assert!(!behavior.contains(CommandBehavior::CLOSE_CONNECTION));
        assert_eq!(CommandBehavior::default(), CommandBehavior::empty());
    }

    #[test]
    fn test_command_defaults() {
        assert_eq!(CommandType::default(), CommandType::Text);
        assert_eq!(UpdateRowSource::default(), UpdateRowSource::Both);
    }
}
