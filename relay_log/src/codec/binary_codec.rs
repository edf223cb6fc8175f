//! Event-stream codec (design component C4): a single self-describing
//! binary map with one entry, `"events"`, whose value is an array of
//! `[sequence, statement_bytes]` pairs.
//!
//! `bincode` over a one-field container gives a canonical, losslessly
//! round-trippable encoding, the same approach the original relay-log
//! binary codec took for its own event container.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::codec::codec::Codec;
use crate::err::RelayLogError;
use crate::model::{Change, EventStream};

#[derive(Debug, Serialize, Deserialize)]
struct WireEventStream {
    events: Vec<(u64, Vec<u8>)>,
}

#[derive(Clone)]
pub struct BinaryCodec {
    options: bincode::DefaultOptions,
}

impl Codec for BinaryCodec {
    fn new() -> Self {
        BinaryCodec {
            options: bincode::options(),
        }
    }

    fn name(&self) -> String {
        "BinaryCodec".to_string()
    }
}

impl BinaryCodec {
    pub fn encode(&self, stream: &EventStream) -> Result<Vec<u8>, RelayLogError> {
        let wire = WireEventStream {
            events: stream
                .iter()
                .map(|change| (change.sequence, change.statement.as_bytes().to_vec()))
                .collect(),
        };
        self.options
            .serialize(&wire)
            .map_err(|e| RelayLogError::Codec(e.to_string()))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<EventStream, RelayLogError> {
        let wire: WireEventStream = self
            .options
            .deserialize(bytes)
            .map_err(|e| RelayLogError::Codec(e.to_string()))?;

        let changes = wire
            .events
            .into_iter()
            .map(|(sequence, bytes)| {
                String::from_utf8(bytes)
                    .map(|statement| Change::new(sequence, statement))
                    .map_err(|e| RelayLogError::Codec(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EventStream::new(changes))
    }
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Codec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_stream() {
        let codec = BinaryCodec::default();
        let stream = EventStream::default();
        let bytes = codec.encode(&stream).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), stream);
    }

    #[test]
    fn round_trips_populated_stream() {
        let codec = BinaryCodec::default();
        let stream = EventStream::new(vec![
            Change::new(1, "INSERT INTO voucher VALUES ('abc')"),
            Change::new(2, "UPDATE voucher SET redeemed = 1"),
        ]);
        let bytes = codec.encode(&stream).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), stream);
    }
}
