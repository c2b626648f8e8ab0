//! Scoped transaction context.
//!
//! A `TransactionContext` owns one connection and at most one SQL
//! transaction, begun lazily on first use. It ends exactly once:
//!
//! - `commit()` / `rollback()` end it explicitly;
//! - dropping it commits, unless a statement failed (`Faulted`) or the
//!   caller asked for `mark_do_not_commit()`, in which case it rolls back.
//!
//! Statements executed through the context that fail mark it faulted, so
//! callers can keep going and let the scope exit roll everything back.

use crate::connection::{Connection, SqlParam};
use crate::error::{Error, Result, TransactionError, TransactionErrorKind};
use crate::row::Row;
use std::cell::Cell;

/// Lifecycle of a [`TransactionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    /// Will roll back when the scope ends
    MarkedDoNotCommit,
    /// A statement failed; will roll back when the scope ends
    Faulted,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

/// One connection plus one lazily-begun transaction.
///
/// Not `Sync`: a context is a single logical unit of work.
pub struct TransactionContext<C: Connection> {
    conn: C,
    begun: Cell<bool>,
    state: Cell<TransactionState>,
}

impl<C: Connection> TransactionContext<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            begun: Cell::new(false),
            state: Cell::new(TransactionState::Open),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    pub fn is_faulted(&self) -> bool {
        self.state.get() == TransactionState::Faulted
    }

    /// Whether a SQL transaction has actually been started.
    pub fn has_begun(&self) -> bool {
        self.begun.get()
    }

    /// The underlying connection, bypassing the transaction bookkeeping.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Roll back at scope exit even if nothing fails.
    pub fn mark_do_not_commit(&self) {
        if self.state.get() == TransactionState::Open {
            self.state.set(TransactionState::MarkedDoNotCommit);
        }
    }

    /// Record that an operation failed; the scope will roll back.
    pub fn mark_faulted(&self) {
        if !self.state.get().is_terminal() {
            self.state.set(TransactionState::Faulted);
        }
    }

    fn ensure_begun(&self) -> Result<()> {
        match self.state.get() {
            TransactionState::Committed => {
                return Err(finished(TransactionErrorKind::AlreadyCommitted));
            }
            TransactionState::RolledBack => {
                return Err(finished(TransactionErrorKind::AlreadyRolledBack));
            }
            _ => {}
        }
        if !self.begun.get() {
            self.conn.begin()?;
            self.begun.set(true);
            tracing::trace!("Transaction begun");
        }
        Ok(())
    }

    fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.mark_faulted();
        }
        result
    }

    /// Commit. A faulted context rolls back instead and reports it.
    pub fn commit(self) -> Result<()> {
        self.finish(true)
    }

    pub fn rollback(self) -> Result<()> {
        self.finish(false)
    }

    fn finish(&self, commit: bool) -> Result<()> {
        let state = self.state.get();
        if state.is_terminal() {
            return Ok(());
        }
        if commit && state == TransactionState::Open {
            if self.begun.get() {
                if let Err(e) = self.conn.commit() {
                    if let Err(rollback) = self.conn.rollback() {
                        tracing::warn!(
                            commit = %e,
                            rollback = %rollback,
                            "Rollback after failed commit also failed"
                        );
                    }
                    self.state.set(TransactionState::RolledBack);
                    return Err(e);
                }
            }
            self.state.set(TransactionState::Committed);
            tracing::debug!(begun = self.begun.get(), "Transaction committed");
            return Ok(());
        }

        let rolled_back = if self.begun.get() {
            self.conn.rollback()
        } else {
            Ok(())
        };
        self.state.set(TransactionState::RolledBack);
        tracing::debug!(from = ?state, "Transaction rolled back");
        rolled_back?;
        if commit && state == TransactionState::Faulted {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Faulted,
                message: "transaction faulted; all statements were rolled back".to_string(),
            }));
        }
        Ok(())
    }
}

fn finished(kind: TransactionErrorKind) -> Error {
    let message = match kind {
        TransactionErrorKind::AlreadyCommitted => "transaction already committed",
        _ => "transaction already rolled back",
    };
    Error::Transaction(TransactionError {
        kind,
        message: message.to_string(),
    })
}

impl<C: Connection> Drop for TransactionContext<C> {
    fn drop(&mut self) {
        if self.state.get().is_terminal() {
            return;
        }
        if let Err(e) = self.finish(true) {
            tracing::warn!(error = %e, "Transaction did not commit at scope exit");
        }
    }
}

impl<C: Connection> Connection for TransactionContext<C> {
    fn query_each(
        &self,
        sql: &str,
        params: &[SqlParam],
        on_row: &mut dyn FnMut(&Row) -> Result<()>,
    ) -> Result<()> {
        self.ensure_begun()?;
        self.guard(self.conn.query_each(sql, params, on_row))
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        self.ensure_begun()?;
        self.guard(self.conn.execute(sql, params))
    }

    fn insert(&self, sql: &str, params: &[SqlParam]) -> Result<i64> {
        self.ensure_begun()?;
        self.guard(self.conn.insert(sql, params))
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.ensure_begun()?;
        self.guard(self.conn.execute_batch(sql))
    }

    fn begin(&self) -> Result<()> {
        self.ensure_begun()
    }

    fn commit(&self) -> Result<()> {
        Err(Error::Transaction(TransactionError {
            kind: TransactionErrorKind::NestedNotSupported,
            message: "commit a TransactionContext through its own commit()".to_string(),
        }))
    }

    fn rollback(&self) -> Result<()> {
        Err(Error::Transaction(TransactionError {
            kind: TransactionErrorKind::NestedNotSupported,
            message: "roll back a TransactionContext through its own rollback()".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueryError, QueryErrorKind};
    use std::cell::RefCell;

    /// Records the statements it is asked to run.
    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<String>>,
        fail_commit: bool,
    }

    impl Recorder {
        fn log(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl Connection for Recorder {
        fn query_each(
            &self,
            sql: &str,
            _params: &[SqlParam],
            _on_row: &mut dyn FnMut(&Row) -> Result<()>,
        ) -> Result<()> {
            self.log.borrow_mut().push(sql.to_string());
            Ok(())
        }

        fn execute(&self, sql: &str, _params: &[SqlParam]) -> Result<u64> {
            self.log.borrow_mut().push(sql.to_string());
            if sql.contains("fail") {
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Syntax,
                    sql: Some(sql.to_string()),
                    message: "syntax error".to_string(),
                    source: None,
                }));
            }
            Ok(1)
        }

        fn insert(&self, sql: &str, _params: &[SqlParam]) -> Result<i64> {
            self.log.borrow_mut().push(sql.to_string());
            Ok(1)
        }

        fn execute_batch(&self, sql: &str) -> Result<()> {
            self.log.borrow_mut().push(sql.to_string());
            Ok(())
        }

        fn begin(&self) -> Result<()> {
            self.log.borrow_mut().push("BEGIN".to_string());
            Ok(())
        }

        fn commit(&self) -> Result<()> {
            self.log.borrow_mut().push("COMMIT".to_string());
            if self.fail_commit {
                return Err(Error::Custom("disk I/O error".to_string()));
            }
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            self.log.borrow_mut().push("ROLLBACK".to_string());
            Ok(())
        }
    }

    #[test]
    fn begins_lazily() {
        let conn = Recorder::default();
        {
            let tx = TransactionContext::new(&conn);
            assert!(!tx.has_begun());
        }
        assert!(conn.log().is_empty());
    }

    #[test]
    fn drop_commits_when_healthy() {
        let conn = Recorder::default();
        {
            let tx = TransactionContext::new(&conn);
            tx.execute("update a", &[]).unwrap();
        }
        assert_eq!(conn.log(), ["BEGIN", "update a", "COMMIT"]);
    }

    #[test]
    fn drop_rolls_back_when_faulted() {
        let conn = Recorder::default();
        {
            let tx = TransactionContext::new(&conn);
            tx.execute("update a", &[]).unwrap();
            assert!(tx.execute("fail b", &[]).is_err());
            assert!(tx.is_faulted());
            tx.execute("update c", &[]).unwrap();
        }
        assert_eq!(
            conn.log(),
            ["BEGIN", "update a", "fail b", "update c", "ROLLBACK"]
        );
    }

    #[test]
    fn do_not_commit_rolls_back() {
        let conn = Recorder::default();
        {
            let tx = TransactionContext::new(&conn);
            tx.insert("insert a", &[]).unwrap();
            tx.mark_do_not_commit();
            assert_eq!(tx.state(), TransactionState::MarkedDoNotCommit);
        }
        assert_eq!(conn.log(), ["BEGIN", "insert a", "ROLLBACK"]);
    }

    #[test]
    fn explicit_commit_of_faulted_context_errors() {
        let conn = Recorder::default();
        let tx = TransactionContext::new(&conn);
        let _ = tx.execute("fail", &[]);
        let err = tx.commit().unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Faulted,
                ..
            })
        ));
        assert_eq!(conn.log(), ["BEGIN", "fail", "ROLLBACK"]);
    }

    #[test]
    fn failed_commit_rolls_back() {
        let conn = Recorder {
            fail_commit: true,
            ..Recorder::default()
        };
        let tx = TransactionContext::new(&conn);
        tx.execute("INSERT 1", &[]).unwrap();
        let err = tx.commit().unwrap_err();
        assert!(err.to_string().contains("disk I/O error"));
        assert_eq!(conn.log(), ["BEGIN", "INSERT 1", "COMMIT", "ROLLBACK"]);
    }

    #[test]
    fn explicit_terminal_happens_once() {
        let conn = Recorder::default();
        let tx = TransactionContext::new(&conn);
        tx.execute("update a", &[]).unwrap();
        tx.rollback().unwrap();
        assert_eq!(conn.log(), ["BEGIN", "update a", "ROLLBACK"]);
    }

    #[test]
    fn nested_commit_is_refused() {
        let conn = Recorder::default();
        let tx = TransactionContext::new(&conn);
        assert!(Connection::commit(&tx).is_err());
        tx.commit().unwrap();
        assert!(conn.log().is_empty());
    }
}
