//! Transaction proxy

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use sturdy_core::{
    Connection, IsolationLevel, Result, RetryPolicyExt, SharedRetryPolicy, Transaction,
};
use uuid::Uuid;

use super::unwrap::raw_transaction;

/// A transaction that commits and rolls back under a retry policy
///
/// Every proxy gets a fresh `transaction_id` for log correlation. It is
/// unrelated to any identifier the driver uses internally.
pub struct TransactionProxy {
    inner: Arc<dyn Transaction>,
    /// Owning connection proxy, fixed at construction
    connection: Option<Arc<dyn Connection>>,
    policy: SharedRetryPolicy,
    transaction_id: Mutex<Uuid>,
    /// Proxy this one was built from; it owns `inner` and must outlive us
    origin: Option<Arc<dyn Transaction>>,
    owns_inner: bool,
    disposed: AtomicBool,
}

impl TransactionProxy {
    /// Wrap a driver transaction owned by `connection`.
    ///
    /// The proxy takes over the transaction: dropping the last handle to an
    /// undisposed proxy disposes it. A proxy passed in keeps ownership and
    /// lives as long as the new one.
    pub fn new(
        transaction: Arc<dyn Transaction>,
        connection: Option<Arc<dyn Connection>>,
        policy: SharedRetryPolicy,
    ) -> Arc<Self> {
        Self::build(transaction, connection, policy, true)
    }

    /// Wrap a transaction read back from a command; dropping it releases nothing
    pub(crate) fn borrowed(
        transaction: Arc<dyn Transaction>,
        connection: Option<Arc<dyn Connection>>,
        policy: SharedRetryPolicy,
    ) -> Arc<Self> {
        Self::build(transaction, connection, policy, false)
    }

    fn build(
        transaction: Arc<dyn Transaction>,
        connection: Option<Arc<dyn Connection>>,
        policy: SharedRetryPolicy,
        owns_inner: bool,
    ) -> Arc<Self> {
        let origin = transaction.inner_transaction().is_some().then(|| transaction.clone());
        let owns_inner = owns_inner && origin.is_none();
        let transaction_id = Uuid::new_v4();
        tracing::debug!(%transaction_id, owns_inner, "wrapping transaction in retry proxy");
        Arc::new(Self {
            inner: raw_transaction(transaction),
            connection,
            policy,
            transaction_id: Mutex::new(transaction_id),
            origin,
            owns_inner,
            disposed: AtomicBool::new(false),
        })
    }

    /// Get the correlation identifier
    pub fn transaction_id(&self) -> Uuid {
        *self.transaction_id.lock()
    }

    /// Replace the correlation identifier, e.g. with one from an outer unit of work
    pub fn set_transaction_id(&self, transaction_id: Uuid) {
        *self.transaction_id.lock() = transaction_id;
    }

    /// Check if `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn release(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(transaction_id = %self.transaction_id(), "disposing transaction");
        self.inner.dispose()
    }
}

impl Transaction for TransactionProxy {
    fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation_level()
    }

    fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.clone()
    }

    #[tracing::instrument(skip(self), fields(transaction_id = %self.transaction_id()))]
    fn commit(&self) -> Result<()> {
        self.policy.execute_unit(|| self.inner.commit())
    }

    #[tracing::instrument(skip(self), fields(transaction_id = %self.transaction_id()))]
    fn rollback(&self) -> Result<()> {
        self.policy.execute_unit(|| self.inner.rollback())
    }

    fn dispose(&self) -> Result<()> {
        self.release()
    }

    fn inner_transaction(&self) -> Option<Arc<dyn Transaction>> {
        Some(self.inner.clone())
    }
}

impl Drop for TransactionProxy {
    fn drop(&mut self) {
        if !self.owns_inner || self.is_disposed() {
            return;
        }
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to dispose transaction on drop");
        }
    }
}

impl fmt::Debug for TransactionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionProxy")
            .field("transaction_id", &self.transaction_id())
            .field("wraps_proxy", &self.origin.is_some())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
