//! Retrying proxies for driver connections, commands and transactions
//!
//! A `ConnectionProxy` wraps a driver connection together with a retry
//! policy. Commands and transactions obtained from it are wrapped as well and
//! share the same policy, so application code that works against
//! `dyn Connection` gets retries without further changes.
//!
//! Retried operations: `open`, `execute_non_query`, `execute_scalar`,
//! `execute_reader`, `prepare`, `commit` and `rollback`. Everything else is
//! forwarded once.
//!
//! # Example
//!
//! ```ignore
//! use sturdy_connection::proxy::ConnectionProxy;
//!
//! let conn = ConnectionProxy::new(driver_connection, policy);
//! conn.open()?; // retried until the policy gives up
//!
//! let tx = conn.begin(IsolationLevel::ReadCommitted)?;
//! let cmd = conn.command()?;
//! cmd.set_transaction(Some(tx.clone()));
//! cmd.set_command_text("UPDATE accounts SET balance = balance - 10 WHERE id = 1");
//! cmd.execute_non_query()?;
//! tx.commit()?;
//! ```

mod command;
mod connection;
mod transaction;
pub mod unwrap;


pub use command::CommandProxy;
pub use connection::ConnectionProxy;
pub use transaction::TransactionProxy;
