/// Connection Management Module
///
/// This module owns the lifecycle of the single shared database handle:
/// it is opened lazily on first use, cached, and handed out to every caller
/// of the same `ConnectionManager`.

use crate::config::ConnectionConfig;
use crate::core::db::driver::{Driver, Link, SqliteDriver};
use crate::core::{DbLinkError, Result};
use once_cell::sync::OnceCell;
use rusqlite::Connection;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// The live connection shared by all callers of one manager.
///
/// Cloning is cheap; every clone refers to the same connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Mutex<Box<dyn Link>>>,
}

impl ConnectionHandle {
    pub fn new(link: Box<dyn Link>) -> Self {
        ConnectionHandle {
            inner: Arc::new(Mutex::new(link)),
        }
    }

    /// Whether two handles refer to the same connection
    pub fn same(a: &ConnectionHandle, b: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Locks the connection for exclusive use
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Link>>> {
        self.inner
            .lock()
            .map_err(|_| DbLinkError::App("Failed to acquire database lock".to_string()))
    }

    /// Whether a transaction is currently open on the connection.
    ///
    /// Takes the connection lock: calling it while a `Transaction` is alive
    /// on the same thread deadlocks. Use `Transaction::is_active` there.
    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self.lock()?.in_transaction())
    }

    /// Runs `f` with exclusive access to the link.
    ///
    /// Blocks until the connection lock is free, so calling it while a
    /// `Transaction` is alive on the same thread deadlocks.
    pub fn with_link<T>(&self, f: impl FnOnce(&mut dyn Link) -> T) -> Result<T> {
        let mut guard = self.lock()?;
        Ok(f(&mut **guard))
    }

    /// Runs `f` against the raw SQLite connection, for operations outside `query`.
    ///
    /// Same locking as `with_link`: not callable while a `Transaction` is
    /// alive on the same thread.
    pub fn with_sqlite<T>(&self, f: impl FnOnce(&Connection) -> T) -> Result<T> {
        let guard = self.lock()?;
        let conn = guard
            .sqlite()
            .ok_or_else(|| DbLinkError::App("Connection is not backed by SQLite".to_string()))?;
        Ok(f(conn))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// Receives connection failures when the caller did not ask to fail fast.
///
/// The manager still returns the error after notifying the view; the view
/// decides whether to render a response or stop the process.
pub trait FailureView: Send + Sync {
    fn on_connection_failure(&self, message: &str);
}

/// Logs connection failures at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogView;

impl FailureView for LogView {
    fn on_connection_failure(&self, message: &str) {
        error!("Database connection failed: {}", message);
    }
}

/// Prints the failure to stderr and exits the process with status 1
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminateView;

impl FailureView for TerminateView {
    fn on_connection_failure(&self, message: &str) {
        error!("Database connection failed: {}", message);
        eprintln!("Unable to connect to the database: {}", message);
        std::process::exit(1);
    }
}

/// Connection manager for database operations
pub struct ConnectionManager {
    config: ConnectionConfig,
    driver: Box<dyn Driver>,
    failure_view: Box<dyn FailureView>,
    handle: OnceCell<ConnectionHandle>,
}

impl ConnectionManager {
    /// Creates a manager for a SQLite database. Nothing is opened until the
    /// first `connect`.
    pub fn new(config: ConnectionConfig) -> Self {
        ConnectionManager::with_driver(config, SqliteDriver)
    }

    /// Creates a manager that opens connections through `driver`
    pub fn with_driver(config: ConnectionConfig, driver: impl Driver + 'static) -> Self {
        ConnectionManager {
            config,
            driver: Box::new(driver),
            failure_view: Box::new(LogView),
            handle: OnceCell::new(),
        }
    }

    /// Replaces the view notified of non-fail-fast connection failures
    pub fn with_failure_view(mut self, view: impl FailureView + 'static) -> Self {
        self.failure_view = Box::new(view);
        self
    }

    /// Returns the shared handle, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns `DbLinkError::Connection` with the driver's message when the
    /// connection cannot be opened. Unless `fail_fast` is set, the failure
    /// view is notified first. A failed attempt is not cached.
    pub fn connect(&self, fail_fast: bool) -> Result<ConnectionHandle> {
        self.connect_ref(fail_fast).cloned()
    }

    /// Same as `connect(false)`: the handle for operations outside `query`
    pub fn link(&self) -> Result<ConnectionHandle> {
        self.connect(false)
    }

    pub(crate) fn connect_ref(&self, fail_fast: bool) -> Result<&ConnectionHandle> {
        let result = self.handle.get_or_try_init(|| {
            debug!(dsn = %self.config.dsn(), "opening database connection");
            self.driver.connect(&self.config).map(ConnectionHandle::new)
        });

        result.map_err(|e| {
            let message = match e {
                DbLinkError::Connection(message) => message,
                other => other.to_string(),
            };
            if !fail_fast {
                self.failure_view.on_connection_failure(&message);
            }
            DbLinkError::Connection(message)
        })
    }

    /// Whether the handle has been opened
    pub fn is_connected(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}
