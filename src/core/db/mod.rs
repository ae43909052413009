/// Database Module
///
/// This module provides the database layer of dblink, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Driver** (`driver.rs`): the `Driver`/`Link` seam and the SQLite implementation
/// - **Values** (`value.rs`): bound parameters and fetched rows
/// - **Connection Management** (`connection.rs`): lazily opens and caches the one shared handle
/// - **Query Execution** (`query.rs`): implicit per-statement transactions and result normalization
/// - **Transactions** (`transaction.rs`): explicit, caller-owned transactions
///
/// ## Error Handling
///
/// All database operations use the `DbLinkError` type.
pub mod connection;
pub mod driver;
pub mod query;
pub mod transaction;
pub mod value;

pub use connection::*;
pub use driver::*;
pub use query::*;
pub use transaction::*;
pub use value::*;
