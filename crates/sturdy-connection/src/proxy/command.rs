//! Command proxy

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use sturdy_core::{
    Command, CommandBehavior, CommandType, Connection, DataReader, Parameter,
    ParameterCollection, Result, RetryPolicyExt, SharedRetryPolicy, Transaction,
    UpdateRowSource, Value,
};

use super::unwrap::{raw_command, raw_transaction, same_object};
use super::{ConnectionProxy, TransactionProxy};

/// A command whose executions run under a retry policy
///
/// The connection and transaction it reports are always proxies; the driver
/// command underneath only ever sees driver objects.
pub struct CommandProxy {
    inner: Arc<dyn Command>,
    /// Connection proxy last assigned to, or resolved for, the command
    connection: Mutex<Option<Arc<dyn Connection>>>,
    /// Transaction proxy last assigned to the command, held until replaced
    transaction: Mutex<Option<Arc<dyn Transaction>>>,
    policy: SharedRetryPolicy,
    /// Proxy this one was built from; it owns `inner` and must outlive us
    origin: Option<Arc<dyn Command>>,
    owns_inner: bool,
    disposed: AtomicBool,
}

impl CommandProxy {
    /// Wrap a driver command running on `connection`.
    ///
    /// A connection that is not already a proxy is wrapped with `policy`.
    /// Dropping the last handle to an undisposed proxy disposes the driver
    /// command, unless `command` was itself a proxy. That proxy keeps
    /// ownership and lives as long as the new one.
    pub fn new(
        command: Arc<dyn Command>,
        connection: Option<Arc<dyn Connection>>,
        policy: SharedRetryPolicy,
    ) -> Arc<Self> {
        let connection = connection.map(|connection| Self::connection_proxy(connection, &policy));
        let origin = command.inner_command().is_some().then(|| command.clone());
        let owns_inner = origin.is_none();
        Arc::new(Self {
            inner: raw_command(command),
            connection: Mutex::new(connection),
            transaction: Mutex::new(None),
            policy,
            origin,
            owns_inner,
            disposed: AtomicBool::new(false),
        })
    }

    /// Check if `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Keep proxies as they are, wrap anything else with the command's policy
    fn connection_proxy(
        connection: Arc<dyn Connection>,
        policy: &SharedRetryPolicy,
    ) -> Arc<dyn Connection> {
        if connection.inner_connection().is_some() {
            return connection;
        }
        let proxy: Arc<dyn Connection> = ConnectionProxy::borrowed(connection, policy.clone());
        proxy
    }

    fn release(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("disposing command");
        self.inner.dispose()
    }
}

impl Command for CommandProxy {
    fn command_text(&self) -> String {
        self.inner.command_text()
    }

    fn set_command_text(&self, text: &str) {
        self.inner.set_command_text(text);
    }

    fn command_timeout(&self) -> u32 {
        self.inner.command_timeout()
    }

    fn set_command_timeout(&self, seconds: u32) {
        self.inner.set_command_timeout(seconds);
    }

    fn command_type(&self) -> CommandType {
        self.inner.command_type()
    }

    fn set_command_type(&self, command_type: CommandType) {
        self.inner.set_command_type(command_type);
    }

    fn design_time_visible(&self) -> bool {
        self.inner.design_time_visible()
    }

    fn set_design_time_visible(&self, visible: bool) {
        self.inner.set_design_time_visible(visible);
    }

    fn updated_row_source(&self) -> UpdateRowSource {
        self.inner.updated_row_source()
    }

    fn set_updated_row_source(&self, source: UpdateRowSource) {
        self.inner.set_updated_row_source(source);
    }

    fn connection(&self) -> Option<Arc<dyn Connection>> {
        let mut remembered = self.connection.lock();
        // The remembered proxy is kept for when the driver gets it back.
        let current = self.inner.connection()?;

        if let Some(proxy) = remembered.as_ref() {
            let unchanged = proxy
                .inner_connection()
                .is_some_and(|raw| same_object(&raw, &current));
            if unchanged {
                return Some(proxy.clone());
            }
        }

        // The driver command was pointed at a connection some other way.
        tracing::debug!("wrapping connection assigned outside the proxy");
        let proxy = Self::connection_proxy(current, &self.policy);
        *remembered = Some(proxy.clone());
        Some(proxy)
    }

    fn set_connection(&self, connection: Option<Arc<dyn Connection>>) {
        let mut remembered = self.connection.lock();
        match connection {
            Some(connection) => {
                let proxy = Self::connection_proxy(connection, &self.policy);
                self.inner.set_connection(proxy.inner_connection());
                *remembered = Some(proxy);
            }
            None => {
                self.inner.set_connection(None);
                *remembered = None;
            }
        }
    }

    fn parameters(&self) -> ParameterCollection {
        self.inner.parameters()
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        let current = self.inner.transaction()?;

        if let Some(proxy) = self.transaction.lock().as_ref() {
            let unchanged = proxy
                .inner_transaction()
                .is_some_and(|raw| same_object(&raw, &current));
            if unchanged {
                return Some(proxy.clone());
            }
        }

        let proxy: Arc<dyn Transaction> =
            TransactionProxy::borrowed(current, self.connection(), self.policy.clone());
        Some(proxy)
    }

    fn set_transaction(&self, transaction: Option<Arc<dyn Transaction>>) {
        let mut remembered = self.transaction.lock();
        match transaction {
            Some(transaction) => {
                self.inner.set_transaction(Some(raw_transaction(transaction.clone())));
                // An owning proxy must outlive the enlistment.
                *remembered = transaction.inner_transaction().is_some().then_some(transaction);
            }
            None => {
                self.inner.set_transaction(None);
                *remembered = None;
            }
        }
    }

    fn cancel(&self) -> Result<()> {
        self.inner.cancel()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn execute_non_query(&self) -> Result<i64> {
        self.policy.execute_value(|| self.inner.execute_non_query())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn execute_scalar(&self) -> Result<Value> {
        self.policy.execute_value(|| self.inner.execute_scalar())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn prepare(&self) -> Result<()> {
        self.policy.execute_unit(|| self.inner.prepare())
    }

    fn create_parameter(&self) -> Parameter {
        self.inner.create_parameter()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn execute_reader(&self, behavior: CommandBehavior) -> Result<Box<dyn DataReader>> {
        self.policy.execute_value(|| self.inner.execute_reader(behavior))
    }

    fn dispose(&self) -> Result<()> {
        self.release()
    }

    fn inner_command(&self) -> Option<Arc<dyn Command>> {
        Some(self.inner.clone())
    }
}

impl Drop for CommandProxy {
    fn drop(&mut self) {
        if !self.owns_inner || self.is_disposed() {
            return;
        }
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to dispose command on drop");
        }
    }
}

impl fmt::Debug for CommandProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProxy")
            .field("has_connection", &self.connection.lock().is_some())
            .field("has_transaction", &self.transaction.lock().is_some())
            .field("wraps_proxy", &self.origin.is_some())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
