pub mod conn;
pub mod err;
pub mod observer;
pub mod replication;

pub use conn::connection::ReplicatedConnection;
pub use conn::cursor::{ReplicatedCursor, TransactionCursor};
pub use err::ConnError;
pub use observer::{Mutation, MutationObserver, MutationObserverFactory};
pub use replication::ServiceObserverFactory;
