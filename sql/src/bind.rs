//! Statement binder (design component C2).
//!
//! Produces a single, fully-literal SQL string from a parameterised
//! statement and its bound arguments, one `?` placeholder per argument,
//! left to right.

use rusqlite::types::Value;
use rusqlite::Connection;

use crate::err::SqlError;

/// Replaces each `?` in `statement` with its corresponding entry of
/// `args`, quoted using `conn`'s own SQL quoting rules.
pub fn bind(conn: &Connection, statement: &str, args: &[Value]) -> Result<String, SqlError> {
    let placeholder_count = statement.chars().filter(|&c| c == '?').count();
    if placeholder_count != args.len() {
        return Err(SqlError::ArgumentCountMismatch {
            expected: placeholder_count,
            got: args.len(),
        });
    }

    let mut result = String::with_capacity(statement.len());
    let mut args = args.iter();
    for ch in statement.chars() {
        if ch == '?' {
            // Checked equal-length above, so every `?` has a matching argument.
            let value = args.next().expect("placeholder count matches argument count");
            result.push_str(&literal(conn, value)?);
        } else {
            result.push(ch);
        }
    }
    Ok(result)
}

pub(crate) fn literal(conn: &Connection, value: &Value) -> Result<String, SqlError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        // `{:?}` always renders a decimal point or exponent, so SQLite parses
        // the literal back with REAL affinity rather than INTEGER.
        Value::Real(f) => Ok(format!("{:?}", f)),
        Value::Text(_) | Value::Blob(_) => conn
            .query_row("SELECT quote(?1)", [value.clone()], |row| row.get(0))
            .map_err(SqlError::from),
    }
}
