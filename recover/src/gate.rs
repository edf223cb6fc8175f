//! The empty-store gate (design component C9): the guard the recovery
//! endpoint uses so recovery can never clobber live state.

use std::future::Future;
use std::pin::Pin;

use rusqlite::params;
use rusqlite::Connection;

use crate::err::RecoverError;

const VOUCHER_TABLE: &str = "voucher";
const SPENDABLE_TOKEN_TABLE: &str = "spendable_token";
const UNSPENDABLE_TOKEN_TABLE: &str = "unspendable_token";

/// Runs `action` inside a single transaction, but only if the voucher and
/// token tables are all empty (or don't exist yet). Propagates whatever
/// `action` returns; commits on success, rolls back on any error
/// including the action's own.
pub async fn call_if_empty<T, F>(conn: &mut Connection, action: F) -> Result<T, RecoverError>
where
    F: for<'a> FnOnce(&'a Connection) -> Pin<Box<dyn Future<Output = Result<T, RecoverError>> + 'a>>,
{
    let txn = conn.transaction()?;

    if !is_empty(&txn)? {
        return Err(RecoverError::NotEmpty);
    }

    let result = action(&txn).await?;
    txn.commit()?;
    Ok(result)
}

fn is_empty(conn: &Connection) -> Result<bool, RecoverError> {
    Ok(!table_has_rows(conn, VOUCHER_TABLE)?
        && !table_has_rows(conn, SPENDABLE_TOKEN_TABLE)?
        && !table_has_rows(conn, UNSPENDABLE_TOKEN_TABLE)?)
}

fn table_has_rows(conn: &Connection, table: &str) -> Result<bool, RecoverError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(false);
    }

    let has_rows: bool =
        conn.query_row(&format!("SELECT EXISTS(SELECT 1 FROM {table})"), [], |row| row.get(0))?;
    Ok(has_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(conn: &Connection) {
        conn.execute_batch(&format!(
            "CREATE TABLE {VOUCHER_TABLE} (number TEXT PRIMARY KEY);
             CREATE TABLE {SPENDABLE_TOKEN_TABLE} (value TEXT PRIMARY KEY);
             CREATE TABLE {UNSPENDABLE_TOKEN_TABLE} (value TEXT PRIMARY KEY);"
        ))
        .unwrap();
    }

    #[tokio::test]
    async fn runs_action_on_an_empty_store() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema(&conn);

        let ran = call_if_empty(&mut conn, |c| {
            Box::pin(async move {
                c.execute(&format!("INSERT INTO {VOUCHER_TABLE} VALUES ('abc')"), [])?;
                Ok(true)
            })
        })
        .await
        .unwrap();

        assert!(ran);
    }

    #[tokio::test]
    async fn tables_missing_entirely_counts_as_empty() {
        let mut conn = Connection::open_in_memory().unwrap();
        let ran = call_if_empty(&mut conn, |_c| Box::pin(async move { Ok(()) })).await;
        assert!(ran.is_ok());
    }

    #[tokio::test]
    async fn refuses_when_a_voucher_row_exists() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema(&conn);
        conn.execute(&format!("INSERT INTO {VOUCHER_TABLE} VALUES ('abc')"), [])
            .unwrap();

        let result = call_if_empty(&mut conn, |_c| {
            Box::pin(async move {
                panic!("action must not run against a non-empty store");
                #[allow(unreachable_code)]
                Ok(())
            })
        })
        .await;

        assert!(matches!(result, Err(RecoverError::NotEmpty)));
    }
}
