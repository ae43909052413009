/// Query Execution Module
///
/// This module runs single statements against the shared connection with an
/// implicit transaction around each call, and normalizes what comes back:
/// rows for reads, the new row id for inserts, plain success otherwise.

use crate::core::db::connection::{ConnectionHandle, ConnectionManager};
use crate::core::db::driver::Link;
use crate::core::db::transaction::Transaction;
use crate::core::db::value::{Params, Row};
use crate::core::{DbLinkError, Result};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, error, info};

/// Kind of statement, deciding the shape of the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// Returns rows
    Read,
    /// Creates a row; the result is its identifier
    Insert,
    /// Any other write or DDL statement
    Other,
}

/// How a statement's kind is derived from its text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    /// First keyword after whitespace, comments and parentheses
    #[default]
    LeadingKeyword,
    /// Case-sensitive `SELECT`, then `INSERT`, anywhere in the text
    Substring,
}

impl StatementKind {
    /// Determines the statement kind from a SQL string
    pub fn from_sql(sql: &str, classifier: Classifier) -> Self {
        match classifier {
            Classifier::LeadingKeyword => {
                let (keyword, rest) = leading_keyword(sql);
                if keyword.eq_ignore_ascii_case("WITH") {
                    StatementKind::from_keyword(main_keyword(rest))
                } else {
                    StatementKind::from_keyword(keyword)
                }
            }
            Classifier::Substring => {
                if sql.contains("SELECT") {
                    StatementKind::Read
                } else if sql.contains("INSERT") {
                    StatementKind::Insert
                } else {
                    StatementKind::Other
                }
            }
        }
    }

    fn from_keyword(keyword: &str) -> Self {
        let keyword = keyword.to_uppercase();
        match keyword.as_str() {
            "SELECT" | "VALUES" | "PRAGMA" | "EXPLAIN" => StatementKind::Read,
            "INSERT" | "REPLACE" => StatementKind::Insert,
            _ => StatementKind::Other,
        }
    }
}

/// Returns the first keyword of `sql` and the text after it, skipping
/// whitespace, `--` and `/* */` comments and opening parentheses
fn leading_keyword(sql: &str) -> (&str, &str) {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(comment) = trimmed.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |end| &comment[end + 1..]);
        } else if let Some(comment) = trimmed.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |end| &comment[end + 2..]);
        } else {
            rest = trimmed;
            break;
        }
    }
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    rest.split_at(end)
}

/// Keywords that can open the statement following a `WITH` clause
const MAIN_KEYWORDS: [&str; 6] = ["SELECT", "VALUES", "INSERT", "REPLACE", "UPDATE", "DELETE"];

/// Returns the keyword of the statement after a `WITH` clause.
///
/// Table expressions are skipped by parenthesis depth; quoted strings,
/// quoted identifiers and comments are never searched.
fn main_keyword(sql: &str) -> &str {
    let bytes = sql.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80;
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |end| i + end + 4);
            }
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b if is_word(b) && !b.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && is_word(bytes[i]) {
                    i += 1;
                }
                let word = &sql[start..i];
                if depth == 0 && MAIN_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k)) {
                    return word;
                }
            }
            _ => i += 1,
        }
    }
    ""
}

/// Options for a single `query` call
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Wrap the statement in its own begin/commit/rollback
    pub transaction: bool,
    /// Log the statement text and any error text
    pub debug: bool,
    /// Begin a transaction even when `transaction` is off
    pub start: bool,
    /// Commit even when `transaction` is off
    pub commit: bool,
    /// Roll back on failure even when `transaction` is off
    pub rollback: bool,
    /// Caller-supplied statement kind; overrides the classifier
    pub kind: Option<StatementKind>,
    pub classifier: Classifier,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            transaction: true,
            debug: false,
            start: false,
            commit: false,
            rollback: false,
            kind: None,
            classifier: Classifier::default(),
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(mut self, on: bool) -> Self {
        self.transaction = on;
        self
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    pub fn start(mut self, on: bool) -> Self {
        self.start = on;
        self
    }

    pub fn commit(mut self, on: bool) -> Self {
        self.commit = on;
        self
    }

    pub fn rollback(mut self, on: bool) -> Self {
        self.rollback = on;
        self
    }

    pub fn kind(mut self, kind: StatementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Builds options from a loose JSON object.
    ///
    /// Absent flags keep their defaults; a flag is on only when its value is
    /// the boolean `true`. `null` yields the defaults.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let defaults = QueryOptions::default();
        let object = match value {
            serde_json::Value::Null => return Ok(defaults),
            serde_json::Value::Object(object) => object,
            _ => {
                return Err(DbLinkError::Config(
                    "query options must be a JSON object".to_string(),
                ))
            }
        };

        let flag = |key: &str, default: bool| match object.get(key) {
            None => default,
            Some(v) => *v == serde_json::Value::Bool(true),
        };

        let kind = match object.get("kind") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(StatementKind::deserialize(v)?),
        };
        let classifier = match object.get("classifier") {
            None | Some(serde_json::Value::Null) => defaults.classifier,
            Some(v) => Classifier::deserialize(v)?,
        };

        Ok(QueryOptions {
            transaction: flag("transaction", defaults.transaction),
            debug: flag("debug", defaults.debug),
            start: flag("start", defaults.start),
            commit: flag("commit", defaults.commit),
            rollback: flag("rollback", defaults.rollback),
            kind,
            classifier,
        })
    }

    /// Kind of `sql` under these options
    pub fn statement_kind(&self, sql: &str) -> StatementKind {
        self.kind
            .unwrap_or_else(|| StatementKind::from_sql(sql, self.classifier))
    }

    fn begins(&self) -> bool {
        self.transaction || self.start
    }

    fn commits(&self) -> bool {
        self.transaction || self.commit
    }

    fn rolls_back(&self) -> bool {
        self.transaction || self.rollback
    }
}

/// Normalized outcome of a statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// A read that matched at least one row
    Rows(Vec<Row>),
    /// A read that matched nothing
    NoRows,
    /// Identifier of the row created by an insert
    InsertId(i64),
    /// Any other successful write
    Done,
}

impl QueryResult {
    /// Rows of a read, `None` for every other outcome
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Rows of a read; no rows for every other outcome
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryResult::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub fn insert_id(&self) -> Option<i64> {
        match self {
            QueryResult::InsertId(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_no_rows(&self) -> bool {
        matches!(self, QueryResult::NoRows)
    }

    pub fn row_count(&self) -> usize {
        self.rows().map_or(0, <[Row]>::len)
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            QueryResult::Rows(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(row)?;
                }
                seq.end()
            }
            QueryResult::NoRows => serializer.serialize_bool(false),
            QueryResult::InsertId(id) => serializer.serialize_i64(*id),
            QueryResult::Done => serializer.serialize_bool(true),
        }
    }
}

/// Executes one statement and shapes its result, without touching the
/// transaction state
pub(crate) fn execute_classified(
    link: &mut dyn Link,
    sql: &str,
    params: &Params,
    options: &QueryOptions,
) -> Result<QueryResult> {
    if options.debug {
        info!("DB Query: {}", sql);
    }

    let kind = options.statement_kind(sql);
    let executed = link.execute(sql, params)?;
    if kind != StatementKind::Read {
        debug!(changes = executed.changes, "statement executed");
    }

    Ok(match kind {
        StatementKind::Read if executed.rows.is_empty() => QueryResult::NoRows,
        StatementKind::Read => QueryResult::Rows(executed.rows),
        StatementKind::Insert => QueryResult::InsertId(link.last_insert_id()),
        StatementKind::Other => QueryResult::Done,
    })
}

/// Driver message carried by an error, without the variant prefix
pub(crate) fn error_message(e: &DbLinkError) -> String {
    match e {
        DbLinkError::Query(message)
        | DbLinkError::Transaction(message)
        | DbLinkError::Connection(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Query execution service over a connection manager
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor<'a> {
    manager: &'a ConnectionManager,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(manager: &'a ConnectionManager) -> Self {
        QueryExecutor { manager }
    }

    /// Executes one statement inside an implicit transaction.
    ///
    /// The connection is locked for the whole call. A transaction is begun
    /// when `transaction` or `start` is set and none is open; it is committed
    /// on success when `transaction` or `commit` is set, and rolled back on
    /// failure when `transaction` or `rollback` is set.
    ///
    /// # Returns
    ///
    /// `Rows` or `NoRows` for reads, `InsertId` for inserts, `Done` otherwise.
    ///
    /// # Errors
    ///
    /// `DbLinkError::Connection` when the connection cannot be opened;
    /// `DbLinkError::Query` with the driver message for any failure after
    /// that, once the owed rollback has been attempted.
    pub fn query(
        &self,
        sql: &str,
        params: impl Into<Params>,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let params = params.into();
        let handle = self.manager.connect_ref(false)?;
        let mut link = handle.lock()?;

        if options.begins() && !link.in_transaction() {
            if let Err(e) = link.begin() {
                let message = error_message(&e);
                if options.debug {
                    error!("DB Error: {}", message);
                }
                return Err(DbLinkError::Query(message));
            }
        }

        let outcome = execute_classified(&mut **link, sql, &params, options).and_then(|result| {
            if options.commits() && link.in_transaction() {
                link.commit()?;
            }
            Ok(result)
        });

        outcome.map_err(|e| {
            let message = error_message(&e);
            if options.debug {
                error!("DB Error: {}", message);
            }
            if options.rolls_back() && link.in_transaction() {
                if let Err(rollback_err) = link.rollback() {
                    error!("Rollback failed: {}", rollback_err);
                }
            }
            DbLinkError::Query(message)
        })
    }

    /// Begins an explicit transaction owned by the caller.
    ///
    /// The connection stays locked until the transaction is committed, rolled
    /// back or dropped; calling `query` on the same manager from the same
    /// thread meanwhile would deadlock, so run statements through the
    /// returned `Transaction`.
    pub fn begin(&self) -> Result<Transaction<'a>> {
        let handle = self.manager.connect_ref(false)?;
        Transaction::begin(handle)
    }

    /// The shared handle, for operations outside `query`
    pub fn link(&self) -> Result<ConnectionHandle> {
        self.manager.link()
    }
}
