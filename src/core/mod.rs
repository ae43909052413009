/// Core Module for dblink
///
/// This module contains the connection lifecycle manager, the query
/// executor and the error types they share.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbLinkError, Result};
