//! Connection proxy
//!
//! Wraps a driver connection and its retry policy. This is the root of a
//! proxy chain: commands and transactions created through it are wrapped in
//! their own proxies that carry the same policy and point back at it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use sturdy_core::{
    Command, Connection, ConnectionState, IsolationLevel, Result, RetryPolicyExt,
    SharedRetryPolicy, SturdyError, Transaction,
};

use super::unwrap::raw_connection;
use super::{CommandProxy, TransactionProxy};

/// A connection that opens under a retry policy
///
/// Always handed out as `Arc<ConnectionProxy>`: commands and transactions
/// created from it keep the `Arc` as their owning connection.
///
/// # Example
///
/// ```ignore
/// let conn = ConnectionProxy::new(driver_connection, Arc::new(my_policy));
/// conn.open()?;
/// let tx = conn.begin(IsolationLevel::Serializable)?;
/// ```
pub struct ConnectionProxy {
    /// The driver connection every call is forwarded to
    inner: Arc<dyn Connection>,
    /// Retry policy, shared with every command and transaction created here
    policy: SharedRetryPolicy,
    /// Self-reference handed out as the owner of commands and transactions
    this: Weak<ConnectionProxy>,
    /// Proxy this one was built from; it owns `inner` and must outlive us
    origin: Option<Arc<dyn Connection>>,
    /// Whether dropping the proxy releases the driver connection
    owns_inner: bool,
    /// Set by the first dispose
    disposed: AtomicBool,
}

impl ConnectionProxy {
    /// Wrap a driver connection.
    ///
    /// The proxy takes over the connection: disposing the proxy, or dropping
    /// the last handle to it, closes and disposes the driver connection.
    /// Passing a proxy wraps the driver connection behind it instead. The
    /// proxy passed in keeps ownership and lives as long as the new one.
    pub fn new(connection: Arc<dyn Connection>, policy: SharedRetryPolicy) -> Arc<Self> {
        Self::build(connection, policy, true)
    }

    /// Wrap a connection the proxy layer did not create.
    ///
    /// `dispose` still forwards, but dropping the proxy leaves the driver
    /// connection alone.
    pub(crate) fn borrowed(connection: Arc<dyn Connection>, policy: SharedRetryPolicy) -> Arc<Self> {
        Self::build(connection, policy, false)
    }

    fn build(connection: Arc<dyn Connection>, policy: SharedRetryPolicy, owns_inner: bool) -> Arc<Self> {
        let origin = connection.inner_connection().is_some().then(|| connection.clone());
        let owns_inner = owns_inner && origin.is_none();
        let inner = raw_connection(connection);
        tracing::debug!(owns_inner, "wrapping connection in retry proxy");
        Arc::new_cyclic(|this| Self {
            inner,
            policy,
            this: this.clone(),
            origin,
            owns_inner,
            disposed: AtomicBool::new(false),
        })
    }

    /// Get the retry policy shared by this proxy chain
    pub fn retry_policy(&self) -> &SharedRetryPolicy {
        &self.policy
    }

    /// Check if `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Begin a transaction and return it as a `TransactionProxy`
    pub fn begin(&self, isolation_level: IsolationLevel) -> Result<Arc<TransactionProxy>> {
        let owner = self.handle()?;
        tracing::debug!(%isolation_level, "beginning transaction");
        let transaction = self.inner.begin_transaction(isolation_level)?;
        Ok(TransactionProxy::new(
            transaction,
            Some(owner),
            self.policy.clone(),
        ))
    }

    /// Begin a transaction at the driver's default isolation level
    pub fn begin_default(&self) -> Result<Arc<TransactionProxy>> {
        self.begin(IsolationLevel::Unspecified)
    }

    /// Create a command and return it as a `CommandProxy`
    pub fn command(&self) -> Result<Arc<CommandProxy>> {
        let owner = self.handle()?;
        let command = self.inner.create_command()?;
        tracing::debug!("created command");
        Ok(CommandProxy::new(command, Some(owner), self.policy.clone()))
    }

    fn handle(&self) -> Result<Arc<dyn Connection>> {
        let this: Arc<ConnectionProxy> = self
            .this
            .upgrade()
            .ok_or_else(|| SturdyError::InvalidState("connection proxy is being dropped".into()))?;
        Ok(this)
    }

    fn release(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let was_open = self.inner.state() == ConnectionState::Open;
        tracing::debug!(was_open, "disposing connection");

        // Dispose even when close fails so the driver connection is released.
        let closed = if was_open { self.inner.close() } else { Ok(()) };
        let disposed = self.inner.dispose();
        closed.and(disposed)
    }
}

impl Connection for ConnectionProxy {
    fn connection_string(&self) -> String {
        self.inner.connection_string()
    }

    fn set_connection_string(&self, connection_string: &str) {
        self.inner.set_connection_string(connection_string);
    }

    fn database(&self) -> String {
        self.inner.database()
    }

    fn data_source(&self) -> String {
        self.inner.data_source()
    }

    fn server_version(&self) -> String {
        self.inner.server_version()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    fn change_database(&self, database: &str) -> Result<()> {
        self.inner.change_database(database)
    }

    fn open(&self) -> Result<()> {
        tracing::debug!("opening connection");
        self.policy.execute_unit(|| {
            // Checked on every attempt: a failed attempt may still have
            // left the connection open.
            let state = self.inner.state();
            if state == ConnectionState::Open {
                tracing::trace!(%state, "connection already open, skipping attempt");
                return Ok(());
            }
            self.inner.open()
        })
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn begin_transaction(&self, isolation_level: IsolationLevel) -> Result<Arc<dyn Transaction>> {
        let transaction: Arc<dyn Transaction> = self.begin(isolation_level)?;
        Ok(transaction)
    }

    fn create_command(&self) -> Result<Arc<dyn Command>> {
        let command: Arc<dyn Command> = self.command()?;
        Ok(command)
    }

    fn dispose(&self) -> Result<()> {
        self.release()
    }

    fn inner_connection(&self) -> Option<Arc<dyn Connection>> {
        Some(self.inner.clone())
    }
}

impl Drop for ConnectionProxy {
    fn drop(&mut self) {
        if !self.owns_inner || self.is_disposed() {
            return;
        }
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to dispose connection on drop");
        }
    }
}

impl fmt::Debug for ConnectionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProxy")
            .field("owns_inner", &self.owns_inner)
            .field("wraps_proxy", &self.origin.is_some())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
