/// # Test Utilities Module
///
/// Testing infrastructure for dblink:
/// - In-memory database fixtures with a standard schema
/// - A scripted driver that records every transaction call
/// - A failure view that remembers what it was shown
/// - Log capture for asserting on emitted tracing output

use crate::config::ConnectionConfig;
use crate::core::db::{ConnectionManager, Driver, Executed, FailureView, Link, Params};
use crate::core::{DbLinkError, Result};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const STANDARD_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        active BOOLEAN DEFAULT TRUE,
        profile_data TEXT
    );

    CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        published BOOLEAN DEFAULT FALSE,
        FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
    );

    INSERT INTO users (username, email, profile_data) VALUES
        ('alice', 'alice@example.com', '{\"location\": \"New York\"}'),
        ('bob', 'bob@example.com', '{\"location\": \"San Francisco\"}'),
        ('charlie', 'charlie@example.com', NULL);

    INSERT INTO posts (user_id, title, published) VALUES
        (1, 'Welcome to Rust', 1),
        (2, 'My Trip to Paris', 0),
        (1, 'Building Terminal UIs', 1);
";

/// In-memory SQLite manager seeded with three users and three posts
pub fn sample_manager() -> ConnectionManager {
    let manager = ConnectionManager::new(ConnectionConfig::in_memory());
    manager
        .link()
        .and_then(|handle| handle.with_sqlite(|conn| conn.execute_batch(STANDARD_SCHEMA)))
        .expect("Failed to open fixture database")
        .expect("Failed to create fixture schema");
    manager
}

/// Driver whose links record `BEGIN`, `EXEC <sql>`, `COMMIT` and `ROLLBACK`
#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    connects: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<String>>>,
    connect_error: Option<String>,
    fail_on: Option<String>,
    fail_begin: bool,
    fail_commit: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver whose every connection attempt fails with `message`
    pub fn failing(message: &str) -> Self {
        FakeDriver {
            connect_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Statements containing `pattern` fail to execute
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    /// Every `begin` fails; no transaction is opened
    pub fn fail_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    /// Every `commit` fails and leaves the transaction open
    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Driver for FakeDriver {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Link>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.connect_error {
            return Err(DbLinkError::Connection(message.clone()));
        }
        Ok(Box::new(FakeLink {
            events: Arc::clone(&self.events),
            fail_on: self.fail_on.clone(),
            fail_begin: self.fail_begin,
            fail_commit: self.fail_commit,
            in_transaction: false,
            last_id: 0,
        }))
    }
}

struct FakeLink {
    events: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
    fail_begin: bool,
    fail_commit: bool,
    in_transaction: bool,
    last_id: i64,
}

impl FakeLink {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Link for FakeLink {
    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn begin(&mut self) -> Result<()> {
        self.record("BEGIN".to_string());
        if self.fail_begin {
            return Err(DbLinkError::Query("cannot start a transaction".to_string()));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.record("COMMIT".to_string());
        if self.fail_commit {
            return Err(DbLinkError::Query("cannot commit - database is locked".to_string()));
        }
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.record("ROLLBACK".to_string());
        self.in_transaction = false;
        Ok(())
    }

    fn execute(&mut self, sql: &str, _params: &Params) -> Result<Executed> {
        self.record(format!("EXEC {}", sql));
        if let Some(pattern) = &self.fail_on {
            if sql.contains(pattern.as_str()) {
                return Err(DbLinkError::Query(format!("forced failure on '{}'", pattern)));
            }
        }
        if sql.contains("INSERT") {
            self.last_id += 1;
        }
        Ok(Executed::default())
    }

    fn last_insert_id(&self) -> i64 {
        self.last_id
    }
}

/// Failure view that keeps every message it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl FailureView for RecordingView {
    fn on_connection_failure(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Shared in-memory sink for formatted log lines
#[derive(Debug, Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber scoped to the current thread and returns
/// everything it logged
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let value = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (value, logs)
}

#[macro_export]
macro_rules! assert_dblink_error {
    ($result:expr, $expected_type:ident, $context:expr) => {
        match $result {
            Err($crate::core::DbLinkError::$expected_type(_)) => {}
            Ok(_) => panic!("Expected {} error but got Ok in {}", stringify!($expected_type), $context),
            Err(other) => panic!("Expected {} but got {:?} in {}", stringify!($expected_type), other, $context),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_manager_fixture() {
        let manager = sample_manager();
        let count: i64 = manager
            .link()
            .unwrap()
            .with_sqlite(|conn| conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)))
            .unwrap()
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_capture_logs_sees_scoped_events() {
        let (value, logs) = capture_logs(|| {
            tracing::info!("inside capture");
            7
        });
        assert_eq!(value, 7);
        assert!(logs.contains("inside capture"), "logs were: {}", logs);

        tracing::info!("outside capture");
        assert!(!logs.contains("outside capture"));
    }

    #[test]
    fn test_error_assertion_macro() {
        let result: Result<i32> = Err(DbLinkError::App("Test error".to_string()));
        assert_dblink_error!(result, App, "macro test");
    }
}
