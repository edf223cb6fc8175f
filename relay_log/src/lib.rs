pub mod codec;
pub mod err;
pub mod model;
pub mod service;
pub mod store;

pub use err::RelayLogError;
pub use model::{Change, EventStream};
pub use service::{ReplicationService, EVENT_STREAM_PREFIX, SNAPSHOT_NAME};
