//! Snapshot codec (design component C3): dump a live database as a
//! sequence of self-contained SQL statements, frame them as netstrings,
//! and recover them back into an empty database.

use nom::bytes::complete::tag;
use nom::character::complete::digit1;
use rusqlite::types::Value;
use rusqlite::Connection;

use crate::bind::literal;
use crate::err::SqlError;

/// Dumps `conn` as an ordered, finite sequence of SQL statements (schema
/// DDL first, then `INSERT` rows per table) that reproduce it from empty.
///
/// Runs inside a single transaction so concurrent writers on the same
/// connection are blocked until the dump completes, giving a consistent
/// view of the database.
pub fn dump(conn: &Connection) -> Result<Vec<String>, SqlError> {
    let txn = conn.unchecked_transaction()?;
    let mut statements = Vec::new();
    let mut tables = Vec::new();

    {
        let mut schema_stmt = txn.prepare(
            "SELECT type, name, sql FROM sqlite_master \
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
             ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, rowid",
        )?;
        let mut rows = schema_stmt.query([])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let name: String = row.get(1)?;
            let sql: String = row.get(2)?;
            statements.push(sql);
            if kind == "table" {
                tables.push(name);
            }
        }
    }

    for table in tables {
        statements.extend(dump_table_rows(&txn, &table)?);
    }

    Ok(statements)
}

fn dump_table_rows(conn: &Connection, table: &str) -> Result<Vec<String>, SqlError> {
    let quoted_table = quote_identifier(table);
    let columns = table_columns(conn, table)?;
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut stmt = conn.prepare(&format!("SELECT {} FROM {}", column_list, quoted_table))?;
    let mut rows = stmt.query([])?;

    let mut statements = Vec::new();
    while let Some(row) = rows.next()? {
        let mut literals = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let value: Value = row.get(i)?;
            literals.push(literal(conn, &value)?);
        }
        statements.push(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted_table,
            column_list,
            literals.join(", ")
        ));
    }
    Ok(statements)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, SqlError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Frames each statement as a netstring: `len(utf8_bytes):<utf8_bytes>,`.
pub fn frame(statements: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for statement in statements {
        let bytes = statement.as_bytes();
        out.extend_from_slice(bytes.len().to_string().as_bytes());
        out.push(b':');
        out.extend_from_slice(bytes);
        out.push(b',');
    }
    out
}

/// Parses a netstring-framed blob back into its statements.
pub fn parse_frames(blob: &[u8]) -> Result<Vec<String>, SqlError> {
    let mut statements = Vec::new();
    let mut input = blob;

    while !input.is_empty() {
        let offset = blob.len() - input.len();

        let (rest, len_bytes) =
            digit1::<_, nom::error::Error<&[u8]>>(input).map_err(|_| SqlError::MalformedFrame(offset))?;
        let declared: usize = std::str::from_utf8(len_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(SqlError::MalformedFrame(offset))?;

        let (rest, _) =
            tag::<_, _, nom::error::Error<&[u8]>>(":")(rest).map_err(|_| SqlError::MalformedFrame(offset))?;

        if rest.len() < declared {
            return Err(SqlError::TruncatedFrame {
                declared,
                available: rest.len(),
            });
        }
        let (body, rest) = rest.split_at(declared);

        let (rest, _) =
            tag::<_, _, nom::error::Error<&[u8]>>(",")(rest).map_err(|_| SqlError::MalformedFrame(offset))?;

        statements.push(String::from_utf8(body.to_vec())?);
        input = rest;
    }

    Ok(statements)
}

/// Executes a netstring-framed snapshot against `conn` inside a single
/// transaction, in order.
pub fn recover(conn: &Connection, blob: &[u8]) -> Result<(), SqlError> {
    let statements = parse_frames(blob)?;
    let txn = conn.unchecked_transaction()?;
    for statement in &statements {
        txn.execute_batch(statement)?;
    }
    txn.commit()?;
    Ok(())
}
