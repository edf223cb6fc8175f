//! The replication service (design component C7): accumulates observed
//! mutations, decides when enough has piled up to be worth an upload, and
//! coordinates snapshot uploads with pruning of now-redundant event-stream
//! fragments.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::err::StoreError;
use common::store::ObjectStore;
use rusqlite::types::Value;
use rusqlite::Connection;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info};

use crate::codec::binary_codec::BinaryCodec;
use crate::codec::codec::Codec;
use crate::err::RelayLogError;
use crate::store as event_log;

pub const DEFAULT_BIG_ENOUGH_THRESHOLD: usize = 570_000;

/// Fixed name every snapshot is uploaded and linked under. A directory
/// listing's one `SNAPSHOT_NAME` entry is always the latest snapshot,
/// since each new upload overwrites it in place.
pub const SNAPSHOT_NAME: &str = "snapshot";

/// Prefix every event-stream upload is named with, followed by its
/// highest sequence number. Shared with the recovery side so it can pick
/// out event-stream entries from a directory listing without guessing.
pub const EVENT_STREAM_PREFIX: &str = "event-stream-";

/// Long-running coordinator for the event log's upload cadence.
///
/// Holds no ownership over the connection's lifetime beyond the shared
/// handle it's constructed with; the connection wrapper (design
/// component C5) is what actually owns and serves the database.
pub struct ReplicationService<S: ObjectStore> {
    conn: Arc<Mutex<Connection>>,
    store: Arc<S>,
    remote_dir: String,
    threshold: usize,
    accumulated_size: AtomicUsize,
    upload_trigger: Semaphore,
}

impl<S: ObjectStore> ReplicationService<S> {
    /// Initialises `accumulated_size` from whatever is already persisted
    /// in the event log, pre-signalling the trigger if that alone already
    /// meets the threshold. `remote_dir` is the directory every upload
    /// this service performs is linked into, so a downloader can later
    /// list it to find them.
    pub async fn new(
        conn: Arc<Mutex<Connection>>,
        store: Arc<S>,
        remote_dir: impl Into<String>,
        threshold: usize,
    ) -> Result<Self, RelayLogError> {
        let accumulated = {
            let guard = conn.lock().await;
            event_log::ensure_schema(&guard)?;
            event_log::get_events(&guard)?
                .iter()
                .map(|change| change.statement.len())
                .sum::<usize>()
        };

        let trigger = Semaphore::new(0);
        if accumulated >= threshold {
            trigger.add_permits(1);
        }

        Ok(ReplicationService {
            conn,
            store,
            remote_dir: remote_dir.into(),
            threshold,
            accumulated_size: AtomicUsize::new(accumulated),
            upload_trigger: trigger,
        })
    }

    /// Awaits the trigger and performs one upload, forever. Upload
    /// failures are logged and do not stop the loop; the next pending
    /// signal (if any) is preserved by the semaphore's own bookkeeping.
    pub async fn run(self: Arc<Self>) {
        loop {
            let permit = self.upload_trigger.acquire().await;
            let permit = match permit {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed: service is being torn down
            };
            permit.forget();

            if let Err(e) = self.upload_event_stream().await {
                error!("event-stream upload failed: {e}");
            }
        }
    }

    /// Marks the trigger signalled; a no-op if it already is, since its
    /// capacity is one slot.
    fn signal_upload(&self) {
        if self.upload_trigger.available_permits() == 0 {
            self.upload_trigger.add_permits(1);
        }
    }

    /// The observer callback invoked synchronously inside the mutation's
    /// own transaction: binds arguments, appends the event row, and
    /// decides whether this mutation is enough to kick off an upload.
    pub fn observe_mutation(
        &self,
        conn: &Connection,
        important: bool,
        statement: &str,
        args: &[Value],
    ) -> Result<(), RelayLogError> {
        let bound = sql::bind(conn, statement, args).map_err(|e| RelayLogError::Codec(e.to_string()))?;
        event_log::add_event(conn, &bound)?;

        let new_size = self.accumulated_size.fetch_add(bound.len(), Ordering::SeqCst) + bound.len();
        if important || new_size >= self.threshold {
            self.signal_upload();
            self.accumulated_size.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    /// One event-stream upload: read the whole log, name it after its
    /// highest sequence number, hand the uploader a retry-friendly
    /// zero-arg provider, then prune what was just uploaded.
    async fn upload_event_stream(&self) -> Result<(), RelayLogError> {
        let events = {
            let guard = self.conn.lock().await;
            event_log::get_events(&guard)?
        };

        let Some(highest) = events.highest_sequence() else {
            return Ok(());
        };

        let name = format!("{EVENT_STREAM_PREFIX}{highest}");
        let bytes = BinaryCodec::default().encode(&events)?;

        self.store
            .upload(&name, &|| bytes.clone())
            .await
            .map_err(store_error)?;
        self.store
            .link(&self.remote_dir, &name, &name)
            .await
            .map_err(store_error)?;
        info!(upload = %name, changes = events.len(), "uploaded event stream");

        let guard = self.conn.lock().await;
        event_log::prune_events_to(&guard, highest)?;
        self.accumulated_size.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Snapshot upload on explicit request: dump+frame the database,
    /// upload it under a fixed name, then prune every remote event-stream
    /// fragment the snapshot now makes redundant.
    pub async fn queue_snapshot_upload(&self) -> Result<(), RelayLogError> {
        let guard = self.conn.lock().await;
        let events = event_log::get_events(&guard)?;
        let high_water = events.highest_sequence().unwrap_or(0);

        let statements = sql::snapshot::dump(&guard)?;
        let framed = sql::snapshot::frame(&statements);

        self.store
            .upload(SNAPSHOT_NAME, &|| framed.clone())
            .await
            .map_err(store_error)?;
        self.store
            .link(&self.remote_dir, SNAPSHOT_NAME, SNAPSHOT_NAME)
            .await
            .map_err(store_error)?;

        let entries = self.store.list(&self.remote_dir).await.map_err(store_error)?;
        for name in entries.keys() {
            if should_prune(name, high_water) {
                self.store.unlink(&self.remote_dir, name).await.map_err(store_error)?;
            }
        }

        event_log::prune_events_to(&guard, high_water)?;
        self.accumulated_size.store(0, Ordering::SeqCst);
        info!(high_water, "uploaded snapshot and pruned event streams");
        Ok(())
    }
}

/// The snapshot-upload pruning predicate: true for any `event-stream-N`
/// with `N <= high_water`, false for anything else (including malformed
/// or unrelated entry names).
pub fn should_prune(entry_name: &str, high_water: u64) -> bool {
    entry_name
        .strip_prefix(EVENT_STREAM_PREFIX)
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .is_some_and(|sequence| sequence <= high_water)
}

fn store_error(e: StoreError) -> RelayLogError {
    RelayLogError::Upload(e.to_string())
}
