//! The event log (design component C6): mutations observed on the
//! replicated connection, persisted as ordinary rows inside the same
//! database, in the same transaction as the mutation they describe.

use rusqlite::{params, Connection};

use crate::err::RelayLogError;
use crate::model::{Change, EventStream};

const TABLE: &str = "replica_event_log";

/// Creates the event log table if it does not already exist. Safe to call
/// on every connection open.
pub fn ensure_schema(conn: &Connection) -> Result<(), RelayLogError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {TABLE} (
            sequence INTEGER PRIMARY KEY AUTOINCREMENT,
            statement TEXT NOT NULL
        )"
    ))?;
    Ok(())
}

/// Appends a bound statement to the event log, returning its assigned
/// sequence number. Must run inside the same transaction as the mutation
/// it records.
pub fn add_event(conn: &Connection, bound_statement: &str) -> Result<u64, RelayLogError> {
    conn.execute(
        &format!("INSERT INTO {TABLE} (statement) VALUES (?1)"),
        params![bound_statement],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Reads every row currently in the event log, in ascending sequence order.
pub fn get_events(conn: &Connection) -> Result<EventStream, RelayLogError> {
    let mut stmt =
        conn.prepare(&format!("SELECT sequence, statement FROM {TABLE} ORDER BY sequence ASC"))?;
    let changes = stmt
        .query_map([], |row| {
            Ok(Change::new(row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EventStream::new(changes))
}

/// Deletes every row whose sequence is at or below `high_water`.
pub fn prune_events_to(conn: &Connection, high_water: u64) -> Result<(), RelayLogError> {
    conn.execute(
        &format!("DELETE FROM {TABLE} WHERE sequence <= ?1"),
        params![high_water as i64],
    )?;
    Ok(())
}
