use std::sync::Arc;

use recover::Recoverer;
use relay_log::ReplicationService;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::memory_store::InMemoryObjectStore;

/// The directory this replica's uploads are linked into, and the one a
/// recovery downloader lists to find them.
pub const REMOTE_DIR: &str = "replica";

pub struct AppState {
    pub conn: Arc<Mutex<Connection>>,
    pub recoverer: Arc<Recoverer>,
    pub store: Arc<InMemoryObjectStore>,
    pub service: Arc<ReplicationService<InMemoryObjectStore>>,
}
