/// dblink Error Module
///
/// This module defines the error types surfaced by the connection manager
/// and the query executor. Connection and query failures carry the driver's
/// message so callers can report it unchanged.
use thiserror::Error;

/// Error type for all dblink operations.
///
/// The two variants callers match on most are:
/// - `Connection`: the driver could not establish the connection
/// - `Query`: prepare, bind or execute failed (after any owed rollback)
#[derive(Error, Debug)]
pub enum DbLinkError {
    /// The driver failed to establish the connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// SQL statement errors (syntax, constraint violations, binding, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Explicit transaction misuse (nested begin, driver begin failure)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON encoding and option parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic application errors for unexpected conditions
    #[error("Application error: {0}")]
    App(String),
}

impl DbLinkError {
    /// Returns true for errors raised while establishing the connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, DbLinkError::Connection(_))
    }

    /// Returns true for statement execution errors.
    pub fn is_query(&self) -> bool {
        matches!(self, DbLinkError::Query(_))
    }
}

/// Type alias for Result to use DbLinkError as the error type.
pub type Result<T> = std::result::Result<T, DbLinkError>;
