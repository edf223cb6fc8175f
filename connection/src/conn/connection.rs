use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use rusqlite::Connection as SqliteConnection;
use tokio::sync::Mutex;

use crate::conn::cursor::{ReplicatedCursor, TransactionCursor};
use crate::err::ConnError;
use crate::observer::MutationObserverFactory;

/// Wraps a SQLite connection, exclusively owning it for its lifetime, and
/// fans out observed mutations to registered observers (design component
/// C5).
///
/// The connection sits behind an `Arc<Mutex<_>>` rather than a bare
/// field so the replication service (C7) can hold the shared,
/// non-owning handle to it that the design calls for, without this type
/// giving up the exclusive-ownership contract: nothing outside this
/// crate can construct a second `ReplicatedConnection` over the same
/// handle.
pub struct ReplicatedConnection {
    conn: Arc<Mutex<SqliteConnection>>,
    replicating: bool,
    observer_factories: Vec<Weak<dyn MutationObserverFactory>>,
}

impl ReplicatedConnection {
    pub fn open(conn: SqliteConnection, enable_replication: bool) -> Self {
        let mut this = ReplicatedConnection {
            conn: Arc::new(Mutex::new(conn)),
            replicating: false,
            observer_factories: Vec::new(),
        };
        if enable_replication {
            this.enable_replication();
        }
        this
    }

    /// Idempotent: once on, replication never turns back off for this
    /// connection's lifetime.
    pub fn enable_replication(&mut self) {
        self.replicating = true;
    }

    pub fn is_replicating(&self) -> bool {
        self.replicating
    }

    pub fn add_mutation_observer(&mut self, factory: Weak<dyn MutationObserverFactory>) {
        self.observer_factories.push(factory);
    }

    /// The shared handle the replication service holds to read and prune
    /// the event log independently of application cursors.
    pub fn shared_handle(&self) -> Arc<Mutex<SqliteConnection>> {
        Arc::clone(&self.conn)
    }

    /// Shorthand for a dump+frame snapshot (component C3) of the current
    /// database state.
    pub async fn snapshot(&self) -> Result<Vec<u8>, ConnError> {
        let guard = self.conn.lock().await;
        let statements = sql::snapshot::dump(&guard)?;
        Ok(sql::snapshot::frame(&statements))
    }

    /// Opens a cursor, instantiating a fresh observer from every factory
    /// still alive. A factory whose owner has already been dropped is
    /// silently skipped.
    pub fn cursor(&mut self) -> ReplicatedCursor {
        let observers = self
            .observer_factories
            .iter()
            .filter_map(Weak::upgrade)
            .map(|factory| factory.create())
            .collect();
        ReplicatedCursor::new(Arc::clone(&self.conn), self.replicating, observers)
    }

    /// Scoped transaction acquisition (design component C5): opens one
    /// SQLite transaction, hands `action` a cursor scoped to it, and
    /// commits on success or rolls back on failure. Every statement
    /// `action` issues through that cursor, and the observer fan-out any
    /// of them trigger, share the one transaction this method commits,
    /// so a multi-statement unit of work replicates atomically or not at
    /// all — the same guarantee a single `ReplicatedCursor::executemany`
    /// call already gives one statement.
    pub async fn transaction<T, F>(&mut self, action: F) -> Result<T, ConnError>
    where
        F: for<'a, 'b> FnOnce(&'a mut TransactionCursor<'b>) -> Pin<Box<dyn Future<Output = Result<T, ConnError>> + 'a>>,
    {
        let mut guard = self.conn.lock().await;
        let observers = self
            .observer_factories
            .iter()
            .filter_map(Weak::upgrade)
            .map(|factory| factory.create())
            .collect();

        let txn = guard.transaction()?;
        let mut cursor = TransactionCursor::new(&txn, self.replicating, observers);
        let result = action(&mut cursor).await;
        drop(cursor);

        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => Err(e), // txn dropped here without commit: SQLite rolls it back
        }
    }

    /// Releases this connection wrapper. The backing SQLite connection is
    /// only actually closed once every other holder of the shared handle
    /// (e.g. a still-running replication service) has also dropped its
    /// reference.
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replication_is_off_until_enabled() {
        let conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), false);
        assert!(!conn.is_replicating());
    }

    #[test]
    fn enable_replication_is_idempotent() {
        let mut conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), false);
        conn.enable_replication();
        conn.enable_replication();
        assert!(conn.is_replicating());
    }

    #[tokio::test]
    async fn transaction_commits_every_statement_on_success() {
        use rusqlite::types::Value;

        let mut conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), false);
        conn.transaction(|cursor| {
            Box::pin(async move {
                cursor.execute("CREATE TABLE t (a INTEGER)", &[])?;
                cursor.execute("INSERT INTO t (a) VALUES (?)", &[Value::Integer(1)])?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let mut cursor = conn.cursor();
        cursor.execute("SELECT a FROM t", &[]).await.unwrap();
        assert_eq!(cursor.fetchone(), Some(vec![Value::Integer(1)]));
    }

    #[tokio::test]
    async fn transaction_rolls_back_every_statement_on_failure() {
        let mut conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), false);
        conn.transaction(|cursor| {
            Box::pin(async move {
                cursor.execute("CREATE TABLE t (a INTEGER)", &[])?;
                Err::<(), ConnError>(ConnError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
            })
        })
        .await
        .unwrap_err();

        let mut cursor = conn.cursor();
        let result = cursor.execute("SELECT a FROM t", &[]).await;
        assert!(result.is_err(), "rolled-back table should not exist");
    }
}
