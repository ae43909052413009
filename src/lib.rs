// Core infrastructure modules
pub mod core;

// Ambient modules
pub mod config;
pub mod logging;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::config::{ConnectionConfig, Profile, Settings};
pub use crate::core::db::{
    Classifier, ConnectionHandle, ConnectionManager, Params, QueryExecutor, QueryOptions, QueryResult,
    Row, StatementKind, Transaction, Value,
};
pub use crate::core::{DbLinkError, Result};
