/// Transaction Module
///
/// Explicit transactions owned by the caller that opened them. The
/// connection stays locked for the transaction's lifetime, so no other caller
/// can commit or roll it back underneath its owner.

use crate::core::db::connection::ConnectionHandle;
use crate::core::db::driver::Link;
use crate::core::db::query::{error_message, execute_classified, QueryOptions, QueryResult};
use crate::core::db::value::Params;
use crate::core::{DbLinkError, Result};
use std::sync::MutexGuard;
use tracing::{debug, error};

/// An open transaction on the shared connection.
///
/// Dropping an unresolved transaction rolls it back.
pub struct Transaction<'a> {
    link: MutexGuard<'a, Box<dyn Link>>,
    resolved: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn begin(handle: &'a ConnectionHandle) -> Result<Self> {
        let mut link = handle.lock()?;
        if link.in_transaction() {
            return Err(DbLinkError::Transaction(
                "a transaction is already open on this connection".to_string(),
            ));
        }
        link.begin()
            .map_err(|e| DbLinkError::Transaction(error_message(&e)))?;
        debug!("transaction started");
        Ok(Transaction {
            link,
            resolved: false,
        })
    }

    /// Executes one statement inside this transaction.
    ///
    /// Only `debug`, `kind` and `classifier` are read from `options`; begin,
    /// commit and rollback belong to the transaction's owner. A failing
    /// statement leaves the transaction open.
    pub fn query(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let params = params.into();
        execute_classified(&mut **self.link, sql, &params, options).map_err(|e| {
            let message = error_message(&e);
            if options.debug {
                error!("DB Error: {}", message);
            }
            DbLinkError::Query(message)
        })
    }

    /// Whether the driver still reports an open transaction
    pub fn is_active(&self) -> bool {
        self.link.in_transaction()
    }

    /// Commits the transaction. On failure it is rolled back when dropped.
    pub fn commit(mut self) -> Result<()> {
        self.link
            .commit()
            .map_err(|e| DbLinkError::Transaction(error_message(&e)))?;
        self.resolved = true;
        debug!("transaction committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.resolved = true;
        if !self.link.in_transaction() {
            return Ok(());
        }
        self.link
            .rollback()
            .map_err(|e| DbLinkError::Transaction(error_message(&e)))?;
        debug!("transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.resolved || !self.link.in_transaction() {
            return;
        }
        debug!("rolling back unresolved transaction");
        if let Err(e) = self.link.rollback() {
            error!("Rollback of dropped transaction failed: {}", e);
        }
    }
}
