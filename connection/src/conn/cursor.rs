use std::collections::VecDeque;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::Connection as SqliteConnection;
use tokio::sync::Mutex;

use crate::err::ConnError;
use crate::observer::{Mutation, MutationObserver};

/// A cursor scoped to the connection that created it (design component
/// C5). A mutating statement's row executes and the fan-out to observers
/// it triggers run inside one transaction, committed once at the end, so
/// a rollback can never leave an event-log row describing a statement
/// that never took effect. A row-returning statement is read out fully
/// into `pending_rows`, which `fetchone`/`fetchmany`/`fetchall` drain.
pub struct ReplicatedCursor {
    conn: Arc<Mutex<SqliteConnection>>,
    replicating: bool,
    important: bool,
    observers: Vec<Box<dyn MutationObserver>>,
    pending_rows: VecDeque<Vec<Value>>,
    lastrowid: i64,
    rowcount: usize,
}

impl ReplicatedCursor {
    pub(crate) fn new(
        conn: Arc<Mutex<SqliteConnection>>,
        replicating: bool,
        observers: Vec<Box<dyn MutationObserver>>,
    ) -> Self {
        ReplicatedCursor {
            conn,
            replicating,
            important: false,
            observers,
            pending_rows: VecDeque::new(),
            lastrowid: 0,
            rowcount: 0,
        }
    }

    /// Marks mutations executed for the lifetime of the returned guard as
    /// important. Reset on every exit path, including unwinding.
    pub fn important(&mut self) -> ImportantGuard<'_> {
        self.important = true;
        ImportantGuard { cursor: self }
    }

    pub async fn execute(&mut self, statement: &str, args: &[Value]) -> Result<(), ConnError> {
        self.executemany(statement, &[args.to_vec()]).await
    }

    /// Executes `statement` once per row of `rows`. A row-returning
    /// statement has every result row, across all executions, buffered
    /// for later retrieval. A mutating statement, with replication
    /// enabled, has its executes and the observer notification they
    /// trigger share one transaction, committed once at the end, so the
    /// event-log row and the mutation it describes can never diverge.
    pub async fn executemany(&mut self, statement: &str, rows: &[Vec<Value>]) -> Result<(), ConnError> {
        let mut guard = self.conn.lock().await;
        self.pending_rows.clear();
        self.rowcount = 0;

        if !sql::mutates(statement) {
            for row in rows {
                let bound = sql::bind(&guard, statement, row)?;
                let mut stmt = guard.prepare(&bound)?;
                let column_count = stmt.column_count();
                let mut result_rows = stmt.query([])?;
                while let Some(result_row) = result_rows.next()? {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        values.push(result_row.get::<_, Value>(i)?);
                    }
                    self.pending_rows.push_back(values);
                }
            }
            return Ok(());
        }

        if !self.replicating {
            for row in rows {
                let bound = sql::bind(&guard, statement, row)?;
                self.rowcount += guard.execute(&bound, [])?;
            }
            self.lastrowid = guard.last_insert_rowid();
            return Ok(());
        }

        let txn = guard.transaction()?;
        for row in rows {
            let bound = sql::bind(&txn, statement, row)?;
            self.rowcount += txn.execute(&bound, [])?;
        }

        if !self.observers.is_empty() {
            let mutation = Mutation {
                important: self.important,
                statement: statement.to_string(),
                rows: rows.to_vec(),
            };
            for observer in &mut self.observers {
                observer.observed(&txn, &mutation)?;
            }
        }

        self.lastrowid = txn.last_insert_rowid();
        txn.commit()?;
        Ok(())
    }

    /// Pops the next buffered result row, or `None` once exhausted.
    pub fn fetchone(&mut self) -> Option<Vec<Value>> {
        self.pending_rows.pop_front()
    }

    /// Pops up to `size` buffered result rows.
    pub fn fetchmany(&mut self, size: usize) -> Vec<Vec<Value>> {
        let mut out = Vec::with_capacity(size.min(self.pending_rows.len()));
        while out.len() < size {
            match self.pending_rows.pop_front() {
                Some(row) => out.push(row),
                None => break,
            }
        }
        out
    }

    /// Drains every remaining buffered result row.
    pub fn fetchall(&mut self) -> Vec<Vec<Value>> {
        self.pending_rows.drain(..).collect()
    }

    /// The rowid `INSERT` last assigned on this cursor, if any.
    pub fn lastrowid(&self) -> i64 {
        self.lastrowid
    }

    /// The row count the last mutating statement affected, or the number
    /// of rows a `SELECT` fetched into the buffer.
    pub fn rowcount(&self) -> usize {
        self.rowcount
    }

    /// Discards any unread buffered rows and drops this cursor's
    /// observers. The underlying connection is unaffected.
    pub fn close(&mut self) {
        self.pending_rows.clear();
        self.observers.clear();
    }
}

pub struct ImportantGuard<'cursor> {
    cursor: &'cursor mut ReplicatedCursor,
}

impl Drop for ImportantGuard<'_> {
    fn drop(&mut self) {
        self.cursor.important = false;
    }
}

/// A cursor scoped to one already-open transaction, handed to the
/// closure passed to `ReplicatedConnection::transaction`. Every statement
/// it executes, mutating or not, runs against that same transaction;
/// nothing it does is visible to another connection handle until the
/// caller commits.
pub struct TransactionCursor<'t> {
    txn: &'t rusqlite::Transaction<'t>,
    replicating: bool,
    important: bool,
    observers: Vec<Box<dyn MutationObserver>>,
    pending_rows: VecDeque<Vec<Value>>,
    lastrowid: i64,
    rowcount: usize,
}

impl<'t> TransactionCursor<'t> {
    pub(crate) fn new(
        txn: &'t rusqlite::Transaction<'t>,
        replicating: bool,
        observers: Vec<Box<dyn MutationObserver>>,
    ) -> Self {
        TransactionCursor {
            txn,
            replicating,
            important: false,
            observers,
            pending_rows: VecDeque::new(),
            lastrowid: 0,
            rowcount: 0,
        }
    }

    pub fn important(&mut self) -> TransactionImportantGuard<'_, 't> {
        self.important = true;
        TransactionImportantGuard { cursor: self }
    }

    pub fn execute(&mut self, statement: &str, args: &[Value]) -> Result<(), ConnError> {
        self.executemany(statement, &[args.to_vec()])
    }

    /// Notifies observers synchronously, inside this transaction, exactly
    /// like `ReplicatedCursor::executemany` does for a single statement —
    /// the difference is that here the transaction outlives this one call
    /// and is committed by the caller once the whole scope succeeds.
    pub fn executemany(&mut self, statement: &str, rows: &[Vec<Value>]) -> Result<(), ConnError> {
        self.pending_rows.clear();
        self.rowcount = 0;

        if !sql::mutates(statement) {
            for row in rows {
                let bound = sql::bind(self.txn, statement, row)?;
                let mut stmt = self.txn.prepare(&bound)?;
                let column_count = stmt.column_count();
                let mut result_rows = stmt.query([])?;
                while let Some(result_row) = result_rows.next()? {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        values.push(result_row.get::<_, Value>(i)?);
                    }
                    self.pending_rows.push_back(values);
                }
            }
            return Ok(());
        }

        for row in rows {
            let bound = sql::bind(self.txn, statement, row)?;
            self.rowcount += self.txn.execute(&bound, [])?;
        }
        self.lastrowid = self.txn.last_insert_rowid();

        if self.replicating && !self.observers.is_empty() {
            let mutation = Mutation {
                important: self.important,
                statement: statement.to_string(),
                rows: rows.to_vec(),
            };
            for observer in &mut self.observers {
                observer.observed(self.txn, &mutation)?;
            }
        }

        Ok(())
    }

    pub fn fetchone(&mut self) -> Option<Vec<Value>> {
        self.pending_rows.pop_front()
    }

    pub fn fetchmany(&mut self, size: usize) -> Vec<Vec<Value>> {
        let mut out = Vec::with_capacity(size.min(self.pending_rows.len()));
        while out.len() < size {
            match self.pending_rows.pop_front() {
                Some(row) => out.push(row),
                None => break,
            }
        }
        out
    }

    pub fn fetchall(&mut self) -> Vec<Vec<Value>> {
        self.pending_rows.drain(..).collect()
    }

    pub fn lastrowid(&self) -> i64 {
        self.lastrowid
    }

    pub fn rowcount(&self) -> usize {
        self.rowcount
    }
}

pub struct TransactionImportantGuard<'cursor, 't> {
    cursor: &'cursor mut TransactionCursor<'t>,
}

impl Drop for TransactionImportantGuard<'_, '_> {
    fn drop(&mut self) {
        self.cursor.important = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::connection::ReplicatedConnection;
    use crate::observer::MutationObserverFactory;
    use std::sync::Arc as StdArc;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn select_does_not_notify_observers_but_is_readable() {
        let mut conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), true);
        let mut cursor = conn.cursor();
        cursor.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(cursor.fetchone(), Some(vec![Value::Integer(1)]));
        assert_eq!(cursor.fetchone(), None);
    }

    #[tokio::test]
    async fn fetchall_drains_every_buffered_row_in_order() {
        let mut conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), true);
        let mut cursor = conn.cursor();
        cursor.execute("CREATE TABLE t (a INTEGER)", &[]).await.unwrap();
        cursor
            .executemany(
                "INSERT INTO t (a) VALUES (?)",
                &[vec![Value::Integer(1)], vec![Value::Integer(2)]],
            )
            .await
            .unwrap();
        cursor.execute("SELECT a FROM t ORDER BY a", &[]).await.unwrap();
        assert_eq!(
            cursor.fetchall(),
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]
        );
    }

    #[tokio::test]
    async fn important_guard_resets_on_drop() {
        let mut conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), true);
        let mut cursor = conn.cursor();
        {
            let guard = cursor.important();
            assert!(guard.cursor.important);
        }
        assert!(!cursor.important);
    }

    struct RecordingObserver(StdArc<StdMutex<Vec<String>>>);
    impl MutationObserver for RecordingObserver {
        fn observed(&mut self, _conn: &SqliteConnection, mutation: &Mutation) -> Result<(), ConnError> {
            self.0.lock().unwrap().push(mutation.statement.clone());
            Ok(())
        }
    }
    struct RecordingFactory(StdArc<StdMutex<Vec<String>>>);
    impl MutationObserverFactory for RecordingFactory {
        fn create(&self) -> Box<dyn MutationObserver> {
            Box::new(RecordingObserver(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn mutation_and_its_event_row_commit_in_one_transaction() {
        let seen = StdArc::new(StdMutex::new(Vec::new()));
        let factory: StdArc<dyn MutationObserverFactory> = StdArc::new(RecordingFactory(seen.clone()));

        let mut conn = ReplicatedConnection::open(SqliteConnection::open_in_memory().unwrap(), true);
        conn.add_mutation_observer(StdArc::downgrade(&factory));

        let mut cursor = conn.cursor();
        cursor.execute("CREATE TABLE t (a INTEGER)", &[]).await.unwrap();
        cursor
            .execute("INSERT INTO t (a) VALUES (?)", &[Value::Integer(1)])
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(cursor.rowcount(), 1);
        assert_eq!(cursor.lastrowid(), 1);
    }
}
