//! Retry Flow Tests
//!
//! Drives the proxies end to end against an in-memory ledger driver whose
//! calls fail transiently a configurable number of times. Covers opening,
//! writing inside a transaction, committing, rolling back and disposal.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once, Weak};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;
use sturdy_connection::{ConnectionProxy, RetryPolicy, SharedRetryPolicy};
use sturdy_core::{
    Command, CommandBehavior, CommandType, Connection, ConnectionState, DataReader,
    IsolationLevel, Parameter, ParameterCollection, SturdyError, Transaction, UpdateRowSource,
    Value,
};

/// Initialize logging for tests if not already initialized
fn initialize_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("sturdy_connection=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Retries transient failures up to a fixed number of attempts
struct RetryUpTo {
    max_attempts: u32,
}

impl RetryPolicy for RetryUpTo {
    fn execute(
        &self,
        operation: &mut dyn FnMut() -> sturdy_core::Result<()>,
    ) -> sturdy_core::Result<()> {
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::debug!(attempt, error = %e, "retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Rows and failure budget shared by everything the driver hands out
#[derive(Default)]
struct Ledger {
    committed: Mutex<Vec<i64>>,
    pending: Mutex<Vec<i64>>,
    failures_left: AtomicU32,
    disposed: AtomicU32,
}

impl Ledger {
    fn with_failures(failures: u32) -> Arc<Self> {
        let ledger = Arc::new(Self::default());
        ledger.failures_left.store(failures, Ordering::SeqCst);
        ledger
    }

    /// Fail while the budget lasts, before any side effect
    fn flake(&self, what: &str) -> sturdy_core::Result<()> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SturdyError::Connection(format!("{} dropped", what)));
        }
        Ok(())
    }

    fn rows(&self) -> Vec<i64> {
        self.committed.lock().clone()
    }
}

struct LedgerConnection {
    this: Weak<LedgerConnection>,
    ledger: Arc<Ledger>,
    state: Mutex<ConnectionState>,
}

impl LedgerConnection {
    fn new(ledger: Arc<Ledger>) -> Arc<dyn Connection> {
        let conn: Arc<LedgerConnection> = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            ledger,
            state: Mutex::new(ConnectionState::Closed),
        });
        conn
    }

    fn handle(&self) -> Option<Arc<dyn Connection>> {
        self.this.upgrade().map(|conn| conn as Arc<dyn Connection>)
    }
}

impl Connection for LedgerConnection {
    fn connection_string(&self) -> String {
        "ledger://memory".into()
    }

    fn set_connection_string(&self, _connection_string: &str) {}

    fn database(&self) -> String {
        "ledger".into()
    }

    fn data_source(&self) -> String {
        "memory".into()
    }

    fn server_version(&self) -> String {
        "1.0".into()
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn change_database(&self, _database: &str) -> sturdy_core::Result<()> {
        Err(SturdyError::NotSupported("single database".into()))
    }

    fn open(&self) -> sturdy_core::Result<()> {
        self.ledger.flake("open")?;
        *self.state.lock() = ConnectionState::Open;
        Ok(())
    }

    fn close(&self) -> sturdy_core::Result<()> {
        *self.state.lock() = ConnectionState::Closed;
        Ok(())
    }

    fn begin_transaction(
        &self,
        isolation_level: IsolationLevel,
    ) -> sturdy_core::Result<Arc<dyn Transaction>> {
        let transaction: Arc<dyn Transaction> = Arc::new(LedgerTransaction {
            ledger: self.ledger.clone(),
            connection: self.handle(),
            isolation_level,
        });
        Ok(transaction)
    }

    fn create_command(&self) -> sturdy_core::Result<Arc<dyn Command>> {
        let command: Arc<dyn Command> = Arc::new(LedgerCommand {
            ledger: self.ledger.clone(),
            text: Mutex::new(String::new()),
            connection: Mutex::new(self.handle()),
            transaction: Mutex::new(None),
            parameters: ParameterCollection::new(),
        });
        Ok(command)
    }

    fn dispose(&self) -> sturdy_core::Result<()> {
        self.ledger.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct LedgerTransaction {
    ledger: Arc<Ledger>,
    connection: Option<Arc<dyn Connection>>,
    isolation_level: IsolationLevel,
}

impl Transaction for LedgerTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.clone()
    }

    fn commit(&self) -> sturdy_core::Result<()> {
        self.ledger.flake("commit")?;
        let pending = std::mem::take(&mut *self.ledger.pending.lock());
        self.ledger.committed.lock().extend(pending);
        Ok(())
    }

    fn rollback(&self) -> sturdy_core::Result<()> {
        self.ledger.flake("rollback")?;
        self.ledger.pending.lock().clear();
        Ok(())
    }

    fn dispose(&self) -> sturdy_core::Result<()> {
        Ok(())
    }
}

struct LedgerCommand {
    ledger: Arc<Ledger>,
    text: Mutex<String>,
    connection: Mutex<Option<Arc<dyn Connection>>>,
    transaction: Mutex<Option<Arc<dyn Transaction>>>,
    parameters: ParameterCollection,
}

impl LedgerCommand {
    /// Amount bound to `@amount`
    fn amount(&self) -> sturdy_core::Result<i64> {
        self.parameters
            .get("@amount")
            .and_then(|p| p.value.as_i64())
            .ok_or_else(|| SturdyError::Query("missing @amount".into()))
    }
}

impl Command for LedgerCommand {
    fn command_text(&self) -> String {
        self.text.lock().clone()
    }

    fn set_command_text(&self, text: &str) {
        *self.text.lock() = text.to_string();
    }

    fn command_timeout(&self) -> u32 {
        30
    }

    fn set_command_timeout(&self, _seconds: u32) {}

    fn command_type(&self) -> CommandType {
        CommandType::Text
    }

    fn set_command_type(&self, _command_type: CommandType) {}

    fn design_time_visible(&self) -> bool {
        true
    }

    fn set_design_time_visible(&self, _visible: bool) {}

    fn updated_row_source(&self) -> UpdateRowSource {
        UpdateRowSource::None
    }

    fn set_updated_row_source(&self, _source: UpdateRowSource) {}

    fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.lock().clone()
    }

    fn set_connection(&self, connection: Option<Arc<dyn Connection>>) {
        *self.connection.lock() = connection;
    }

    fn parameters(&self) -> ParameterCollection {
        self.parameters.clone()
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.transaction.lock().clone()
    }

    fn set_transaction(&self, transaction: Option<Arc<dyn Transaction>>) {
        *self.transaction.lock() = transaction;
    }

    fn cancel(&self) -> sturdy_core::Result<()> {
        Ok(())
    }

    fn execute_non_query(&self) -> sturdy_core::Result<i64> {
        self.ledger.flake("insert")?;
        let amount = self.amount()?;
        match self.transaction.lock().as_ref() {
            Some(transaction) if transaction.inner_transaction().is_some() => {
                return Err(SturdyError::Driver("foreign transaction object".into()));
            }
            Some(_) => {}
            None => return Err(SturdyError::Transaction("writes need a transaction".into())),
        }
        self.ledger.pending.lock().push(amount);
        Ok(1)
    }

    fn execute_scalar(&self) -> sturdy_core::Result<Value> {
        self.ledger.flake("sum")?;
        Ok(Value::Int64(self.ledger.committed.lock().iter().sum()))
    }

    fn prepare(&self) -> sturdy_core::Result<()> {
        self.ledger.flake("prepare")
    }

    fn create_parameter(&self) -> Parameter {
        Parameter::new("@amount", Value::Null)
    }

    fn execute_reader(
        &self,
        _behavior: CommandBehavior,
    ) -> sturdy_core::Result<Box<dyn DataReader>> {
        self.ledger.flake("select")?;
        let reader: Box<dyn DataReader> = Box::new(LedgerReader {
            rows: self.ledger.rows(),
            position: None,
        });
        Ok(reader)
    }

    fn dispose(&self) -> sturdy_core::Result<()> {
        Ok(())
    }
}

struct LedgerReader {
    rows: Vec<i64>,
    position: Option<usize>,
}

impl DataReader for LedgerReader {
    fn field_count(&self) -> usize {
        1
    }

    fn read(&mut self) -> sturdy_core::Result<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        Ok(next < self.rows.len())
    }

    fn get(&self, ordinal: usize) -> sturdy_core::Result<Value> {
        self.position
            .filter(|_| ordinal == 0)
            .and_then(|row| self.rows.get(row))
            .map(|amount| Value::Int64(*amount))
            .ok_or_else(|| SturdyError::InvalidState("no current row".into()))
    }

    fn next_result(&mut self) -> sturdy_core::Result<bool> {
        Ok(false)
    }

    fn close(&mut self) -> sturdy_core::Result<()> {
        Ok(())
    }
}

fn connect(ledger: &Arc<Ledger>, max_attempts: u32) -> Arc<ConnectionProxy> {
    initialize_logging();
    let policy: SharedRetryPolicy = Arc::new(RetryUpTo { max_attempts });
    ConnectionProxy::new(LedgerConnection::new(ledger.clone()), policy)
}

fn insert(conn: &ConnectionProxy, tx: &Arc<dyn Transaction>, amount: i64) -> Result<i64> {
    let cmd = conn.command()?;
    cmd.set_command_text("INSERT INTO entries (amount) VALUES (@amount)");
    cmd.set_transaction(Some(tx.clone()));
    cmd.parameters().add_with_value("@amount", amount);
    let rows = cmd
        .execute_non_query()
        .with_context(|| format!("Failed to insert {}", amount))?;
    Ok(rows)
}

/// Committed writes survive transient failures anywhere along the way
#[rstest]
#[case::steady(0)]
#[case::one_blip(1)]
#[case::flaky(3)]
#[case::very_flaky(4)]
fn test_commit_survives_transient_failures(#[case] failures: u32) -> Result<()> {
    let ledger = Ledger::with_failures(failures);
    let conn = connect(&ledger, 5);

    conn.open().context("Failed to open")?;
    assert_eq!(conn.state(), ConnectionState::Open);

    let tx: Arc<dyn Transaction> = conn.begin(IsolationLevel::Serializable)?;
    assert_eq!(insert(&conn, &tx, 10)?, 1);
    assert_eq!(insert(&conn, &tx, 32)?, 1);
    tx.commit().context("Failed to commit")?;

    assert_eq!(ledger.rows(), vec![10, 32]);

    let sum = conn.command()?;
    sum.set_command_text("SELECT SUM(amount) FROM entries");
    assert_eq!(sum.execute_scalar()?, Value::Int64(42));

    Ok(())
}

/// Rolled back writes are discarded
#[rstest]
#[case::steady(0)]
#[case::flaky(2)]
fn test_rollback_discards_pending_rows(#[case] failures: u32) -> Result<()> {
    let ledger = Ledger::with_failures(failures);
    let conn = connect(&ledger, 5);
    conn.open()?;

    let tx: Arc<dyn Transaction> = conn.begin_default()?;
    insert(&conn, &tx, 7)?;
    tx.rollback()?;

    assert_eq!(ledger.rows(), Vec::<i64>::new());
    Ok(())
}

/// The reader sees the committed rows in order
#[rstest]
#[case::steady(0)]
#[case::flaky(2)]
fn test_reader_returns_committed_rows(#[case] failures: u32) -> Result<()> {
    let ledger = Ledger::with_failures(0);
    let conn = connect(&ledger, 5);
    conn.open()?;

    let tx: Arc<dyn Transaction> = conn.begin(IsolationLevel::ReadCommitted)?;
    for amount in [1, 2, 3] {
        insert(&conn, &tx, amount)?;
    }
    tx.commit()?;

    ledger.failures_left.store(failures, Ordering::SeqCst);
    let cmd = conn.command()?;
    cmd.set_command_text("SELECT amount FROM entries");
    cmd.prepare()?;
    let mut reader = cmd.execute_reader(CommandBehavior::SEQUENTIAL_ACCESS)?;

    let mut amounts = Vec::new();
    while reader.read()? {
        amounts.push(reader.get(0)?.as_i64().context("amount is not an integer")?);
    }
    reader.close()?;

    assert_eq!(amounts, vec![1, 2, 3]);
    Ok(())
}

/// Running out of attempts surfaces the driver's error and writes nothing
#[test]
fn test_exhausted_policy_surfaces_driver_error() -> Result<()> {
    let ledger = Ledger::with_failures(0);
    let conn = connect(&ledger, 2);
    conn.open()?;

    let tx: Arc<dyn Transaction> = conn.begin_default()?;
    ledger.failures_left.store(2, Ordering::SeqCst);
    let err = insert(&conn, &tx, 5).unwrap_err();

    let cause = err
        .downcast_ref::<SturdyError>()
        .context("expected a driver error")?;
    assert!(matches!(cause, SturdyError::Connection(_)));
    assert!(cause.is_transient());

    tx.commit()?;
    assert_eq!(ledger.rows(), Vec::<i64>::new());
    Ok(())
}

/// Non-transient failures are not retried
#[test]
fn test_missing_transaction_is_not_retried() -> Result<()> {
    let ledger = Ledger::with_failures(0);
    let conn = connect(&ledger, 5);
    conn.open()?;

    let cmd = conn.command()?;
    cmd.parameters().add_with_value("@amount", 1);
    let result = cmd.execute_non_query();

    assert!(matches!(result, Err(SturdyError::Transaction(_))));
    Ok(())
}

/// Assigning the bare driver connection to a command keeps retries on
#[test]
fn test_raw_connection_on_command_gets_command_policy() -> Result<()> {
    let ledger = Ledger::with_failures(0);
    let conn = connect(&ledger, 5);
    let cmd = conn.command()?;

    let bare = LedgerConnection::new(ledger.clone());
    cmd.set_connection(Some(bare));

    ledger.failures_left.store(3, Ordering::SeqCst);
    let wrapped = cmd.connection().context("command lost its connection")?;
    wrapped.open()?;

    assert_eq!(wrapped.state(), ConnectionState::Open);
    assert!(wrapped.inner_connection().is_some());
    Ok(())
}

/// Disposing closes the connection and releases it exactly once
#[test]
fn test_dispose_releases_once() -> Result<()> {
    let ledger = Ledger::with_failures(0);
    let conn = connect(&ledger, 5);
    conn.open()?;

    conn.dispose()?;
    conn.dispose()?;
    drop(conn);

    assert_eq!(ledger.disposed.load(Ordering::SeqCst), 1);
    Ok(())
}

/// Dropping the last handle releases the connection
#[test]
fn test_drop_releases_connection() {
    let ledger = Ledger::with_failures(0);
    {
        let conn = connect(&ledger, 5);
        let _tx = conn.begin_default();
    }

    assert_eq!(ledger.disposed.load(Ordering::SeqCst), 1);
}
