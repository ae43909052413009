/// Driver Module
///
/// The seam between the connection manager and the database engine.
/// A `Driver` opens a `Link`; the link is the live connection the executor
/// runs statements on. `SqliteDriver` is the production implementation.

use crate::config::{ConnectionConfig, DriverOptions, ErrorMode, FetchMode, PrepareMode};
use crate::core::db::value::{Params, Row, Value};
use crate::core::{DbLinkError, Result};
use rusqlite::{Connection, Statement};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rows and side effects of one executed statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Executed {
    /// Rows produced by the statement (empty for most writes)
    pub rows: Vec<Row>,
    /// Number of rows changed by the statement
    pub changes: u64,
}

/// A live database connection.
///
/// Driver failures are reported as `DbLinkError::Query` carrying the driver's
/// message.
pub trait Link: Send {
    /// Whether a transaction is currently open (level-insensitive)
    fn in_transaction(&self) -> bool;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Prepares, binds and runs one statement, collecting every row it yields
    fn execute(&mut self, sql: &str, params: &Params) -> Result<Executed>;

    /// Identifier of the most recently inserted row
    fn last_insert_id(&self) -> i64;

    /// Raw SQLite connection, when the link is backed by one
    fn sqlite(&self) -> Option<&Connection> {
        None
    }
}

/// Opens links from a connection description
pub trait Driver: Send + Sync {
    /// Fails with `DbLinkError::Connection` carrying the driver's message
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Link>>;
}

/// Driver for SQLite databases through rusqlite
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Link>> {
        let link = SqliteLink::open(config).map_err(|e| {
            if config.options.error_mode == ErrorMode::Warning {
                warn!(dsn = %config.dsn(), "connection failed: {}", e);
            }
            e
        })?;
        Ok(Box::new(link))
    }
}

/// A rusqlite connection plus the configured driver options
#[derive(Debug)]
pub struct SqliteLink {
    conn: Connection,
    options: DriverOptions,
}

impl SqliteLink {
    /// Opens the database described by `config`
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        if !config.engine.eq_ignore_ascii_case("sqlite") {
            return Err(DbLinkError::Connection(format!(
                "unsupported database engine '{}'",
                config.engine
            )));
        }
        let encoding = config.sqlite_encoding()?;
        let path = config.database_path();

        debug!(dsn = %config.dsn(), "opening sqlite database");
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&path)
        }
        .map_err(connection_error)?;

        conn.pragma_update(None, "encoding", encoding)
            .map_err(connection_error)?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(connection_error)?;

        Ok(SqliteLink {
            conn,
            options: config.options,
        })
    }

    /// Wraps an already open connection
    pub fn from_connection(conn: Connection, options: DriverOptions) -> Self {
        SqliteLink { conn, options }
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.options.error_mode == ErrorMode::Warning {
                warn!("driver error: {}", e);
            }
        }
        result
    }

    fn batch(&mut self, sql: &str) -> Result<()> {
        let result = self.conn.execute_batch(sql).map_err(query_error);
        self.report(result)
    }
}

impl Link for SqliteLink {
    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin(&mut self) -> Result<()> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.batch("ROLLBACK")
    }

    fn execute(&mut self, sql: &str, params: &Params) -> Result<Executed> {
        let fetch_mode = self.options.fetch_mode;
        let result = match self.options.prepare_mode {
            PrepareMode::Native => self
                .conn
                .prepare(sql)
                .map_err(query_error)
                .and_then(|mut stmt| run_statement(&mut stmt, params, fetch_mode)),
            PrepareMode::Cached => self
                .conn
                .prepare_cached(sql)
                .map_err(query_error)
                .and_then(|mut stmt| run_statement(&mut stmt, params, fetch_mode)),
        };
        let result = result.map(|rows| Executed {
            rows,
            changes: self.conn.changes(),
        });
        self.report(result)
    }

    fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn sqlite(&self) -> Option<&Connection> {
        Some(&self.conn)
    }
}

fn connection_error(e: rusqlite::Error) -> DbLinkError {
    DbLinkError::Connection(e.to_string())
}

fn query_error(e: rusqlite::Error) -> DbLinkError {
    DbLinkError::Query(e.to_string())
}

/// Binds `params`, steps the statement to completion and collects its rows
fn run_statement(stmt: &mut Statement<'_>, params: &Params, fetch_mode: FetchMode) -> Result<Vec<Row>> {
    bind_params(stmt, params)?;

    let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = stmt.column_count();

    let mut rows = stmt.raw_query();
    let mut collected = Vec::new();
    while let Some(row) = rows.next().map_err(query_error)? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(Value::from(row.get_ref(i).map_err(query_error)?));
        }
        collected.push(Row::new(Arc::clone(&columns), values, fetch_mode));
    }
    Ok(collected)
}

fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    let expected = stmt.parameter_count();
    match params {
        Params::Positional(values) => {
            if values.len() != expected {
                return Err(DbLinkError::Query(format!(
                    "statement expects {} parameter(s), {} given",
                    expected,
                    values.len()
                )));
            }
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value).map_err(query_error)?;
            }
        }
        Params::Named(named) => {
            let mut bound = BTreeSet::new();
            for (name, value) in named {
                let index = parameter_index(stmt, name)?;
                stmt.raw_bind_parameter(index, value).map_err(query_error)?;
                bound.insert(index);
            }
            if bound.len() != expected {
                return Err(DbLinkError::Query(format!(
                    "statement expects {} parameter(s), {} bound",
                    expected,
                    bound.len()
                )));
            }
        }
    }
    Ok(())
}

/// Resolves a parameter key to its one-based index.
///
/// `?N` keys address positions directly; bare names are tried with each of
/// the `:`, `@` and `$` prefixes.
fn parameter_index(stmt: &Statement<'_>, name: &str) -> Result<usize> {
    if let Some(position) = name.strip_prefix('?').and_then(|n| n.parse::<usize>().ok()) {
        if position >= 1 && position <= stmt.parameter_count() {
            return Ok(position);
        }
    } else if name.starts_with([':', '@', '$']) {
        if let Some(index) = stmt.parameter_index(name).map_err(query_error)? {
            return Ok(index);
        }
    } else {
        for prefix in [":", "@", "$"] {
            let candidate = format!("{}{}", prefix, name);
            if let Some(index) = stmt.parameter_index(&candidate).map_err(query_error)? {
                return Ok(index);
            }
        }
    }
    Err(DbLinkError::Query(format!("unknown parameter '{}'", name)))
}
