//! End-to-end coverage of the replication service's upload cadence and
//! the snapshot-triggered prune, against a local SQLite connection and
//! an in-memory fake object store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use common::err::StoreError;
use common::store::ObjectStore;
use relay_log::service::{should_prune, ReplicationService};
use rusqlite::types::Value;
use rusqlite::Connection;
use tokio::sync::Mutex;

#[derive(Default)]
struct FakeStore {
    blobs: StdMutex<BTreeMap<String, Vec<u8>>>,
    directories: StdMutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl FakeStore {
    fn new() -> Self {
        Self::default()
    }

    fn uploaded_names(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn upload(&self, name: &str, provider: &(dyn Fn() -> Vec<u8> + Send + Sync)) -> Result<(), StoreError> {
        self.blobs.lock().unwrap().insert(name.to_string(), provider());
        Ok(())
    }

    async fn link(&self, dir: &str, name: &str, child: &str) -> Result<(), StoreError> {
        self.directories
            .lock()
            .unwrap()
            .entry(dir.to_string())
            .or_default()
            .insert(name.to_string(), child.to_string());
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.directories.lock().unwrap().get(dir).cloned().unwrap_or_default())
    }

    async fn unlink(&self, dir: &str, name: &str) -> Result<(), StoreError> {
        if let Some(entries) = self.directories.lock().unwrap().get_mut(dir) {
            entries.remove(name);
        }
        Ok(())
    }
}

fn open_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE voucher (number TEXT PRIMARY KEY, value REAL)")
        .unwrap();
    conn
}

const REMOTE_DIR: &str = "remote";

#[tokio::test]
async fn important_mutation_triggers_an_upload_linked_into_the_remote_directory() {
    let conn = Arc::new(Mutex::new(open_db()));
    let store = Arc::new(FakeStore::new());
    let service = Arc::new(
        ReplicationService::new(conn.clone(), store.clone(), REMOTE_DIR, 1_000_000)
            .await
            .unwrap(),
    );

    let handle = tokio::spawn(Arc::clone(&service).run());

    {
        let guard = conn.lock().await;
        service
            .observe_mutation(&guard, true, "INSERT INTO voucher VALUES (?, ?)", &[Value::Text("a".into()), Value::Real(1.0)])
            .unwrap();
    }

    // Give the background task a chance to observe the signalled permit.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(store.uploaded_names(), vec!["event-stream-1".to_string()]);
    // The upload is only discoverable by a downloader if it was actually
    // linked into the remote directory, not merely uploaded by name.
    let listed = store.list(REMOTE_DIR).await.unwrap();
    assert!(listed.contains_key("event-stream-1"));

    handle.abort();
}

#[tokio::test]
async fn threshold_crossing_triggers_an_upload_without_the_important_flag() {
    let conn = Arc::new(Mutex::new(open_db()));
    let store = Arc::new(FakeStore::new());
    // A tiny threshold so a single ordinary mutation already crosses it.
    let service = Arc::new(
        ReplicationService::new(conn.clone(), store.clone(), REMOTE_DIR, 10)
            .await
            .unwrap(),
    );

    let handle = tokio::spawn(Arc::clone(&service).run());

    {
        let guard = conn.lock().await;
        service
            .observe_mutation(
                &guard,
                false,
                "INSERT INTO voucher VALUES (?, ?)",
                &[Value::Text("b".into()), Value::Real(2.0)],
            )
            .unwrap();
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(store.uploaded_names(), vec!["event-stream-1".to_string()]);
    handle.abort();
}

#[tokio::test]
async fn snapshot_upload_prunes_event_streams_at_or_below_the_high_water_mark() {
    let conn = Arc::new(Mutex::new(open_db()));
    let store = Arc::new(FakeStore::new());
    let service = Arc::new(
        ReplicationService::new(conn.clone(), store.clone(), REMOTE_DIR, 1_000_000)
            .await
            .unwrap(),
    );

    // A first, real upload-and-link cycle, exercising the same path a
    // background cadence would have taken earlier in this replica's life.
    let handle = tokio::spawn(Arc::clone(&service).run());
    {
        let guard = conn.lock().await;
        service
            .observe_mutation(&guard, true, "INSERT INTO voucher VALUES (?, ?)", &[Value::Text("c".into()), Value::Real(3.0)])
            .unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.abort();
    assert!(store.list(REMOTE_DIR).await.unwrap().contains_key("event-stream-1"));

    {
        let guard = conn.lock().await;
        service
            .observe_mutation(&guard, false, "INSERT INTO voucher VALUES (?, ?)", &[Value::Text("d".into()), Value::Real(4.0)])
            .unwrap();
    }

    // A fragment from far in the future (e.g. a concurrent writer this
    // replica hasn't caught up with yet) must survive this replica's own
    // snapshot, since its sequence is well beyond anything dumped here.
    store.link(REMOTE_DIR, "event-stream-1234", "event-stream-1234").await.unwrap();

    service.queue_snapshot_upload().await.unwrap();

    assert!(store.uploaded_names().contains(&"snapshot".to_string()));

    let remaining = store.list(REMOTE_DIR).await.unwrap();
    assert!(remaining.contains_key("snapshot"));
    assert!(!remaining.contains_key("event-stream-1"));
    assert!(remaining.contains_key("event-stream-1234"));

    let guard = conn.lock().await;
    let events = relay_log::store::get_events(&guard).unwrap();
    assert!(events.is_empty());
}

#[test]
fn prune_predicate_agrees_with_the_snapshot_scenario_above() {
    assert!(should_prune("event-stream-1", 2));
    assert!(should_prune("event-stream-2", 2));
    assert!(!should_prune("event-stream-1234", 2));
}
