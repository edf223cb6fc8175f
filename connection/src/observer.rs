//! The observer protocol a replicated cursor (design component C5) drives
//! on every mutating statement.

use rusqlite::types::Value;
use rusqlite::Connection;

use crate::err::ConnError;

/// One observed mutation: the unbound statement text plus the raw
/// argument rows it was (or will be) executed with. Binding to literal
/// SQL is left to the observer, which needs its own copy for the event
/// log regardless of how the cursor itself executed the statement.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub important: bool,
    pub statement: String,
    pub rows: Vec<Vec<Value>>,
}

/// A per-transaction observer instance. A fresh one is created for every
/// cursor so observer-local state (e.g. accumulated size) never leaks
/// across cursors that outlive one another.
pub trait MutationObserver: Send {
    fn observed(&mut self, conn: &Connection, mutation: &Mutation) -> Result<(), ConnError>;
}

/// Registered on the connection; held weakly so the connection never
/// keeps an observer's owner alive and the two can't form a reference
/// cycle.
pub trait MutationObserverFactory: Send + Sync {
    fn create(&self) -> Box<dyn MutationObserver>;
}
