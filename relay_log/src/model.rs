//! The event-stream data model (design component C4's types): an
//! immutable `Change` and the ordered `EventStream` that contains it.

use serde::{Deserialize, Serialize};

/// One committed mutation, already bound to literal SQL.
///
/// `sequence` is strictly positive, monotonically increasing within any
/// single stream, and unique within the event log that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub sequence: u64,
    pub statement: String,
}

impl Change {
    pub fn new(sequence: u64, statement: impl Into<String>) -> Self {
        Change {
            sequence,
            statement: statement.into(),
        }
    }
}

/// An ordered sequence of `Change` values with strictly increasing
/// sequence numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStream(Vec<Change>);

impl EventStream {
    pub fn new(changes: Vec<Change>) -> Self {
        EventStream(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The largest sequence number present, or `None` for an empty stream.
    pub fn highest_sequence(&self) -> Option<u64> {
        self.0.last().map(|change| change.sequence)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Change] {
        &self.0
    }
}

impl IntoIterator for EventStream {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Change> for EventStream {
    fn from_iter<T: IntoIterator<Item = Change>>(iter: T) -> Self {
        EventStream(iter.into_iter().collect())
    }
}
