//! An in-memory `ObjectStore` and matching `Downloader`, standing in for
//! a real remote backend so this binary can be exercised end to end
//! without one. Not part of the core; illustrative only.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::err::StoreError;
use common::store::ObjectStore;
use recover::{Downloader, RecoverError};

#[derive(Default)]
pub struct InMemoryObjectStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    directories: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().expect("object store mutex poisoned").get(name).cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(
        &self,
        name: &str,
        provider: &(dyn Fn() -> Vec<u8> + Send + Sync),
    ) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .expect("object store mutex poisoned")
            .insert(name.to_string(), provider());
        Ok(())
    }

    async fn link(&self, dir: &str, name: &str, child: &str) -> Result<(), StoreError> {
        self.directories
            .lock()
            .expect("object store mutex poisoned")
            .entry(dir.to_string())
            .or_default()
            .insert(name.to_string(), child.to_string());
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self
            .directories
            .lock()
            .expect("object store mutex poisoned")
            .get(dir)
            .cloned()
            .unwrap_or_default())
    }

    async fn unlink(&self, dir: &str, name: &str) -> Result<(), StoreError> {
        if let Some(entries) = self.directories.lock().expect("object store mutex poisoned").get_mut(dir) {
            entries.remove(name);
        }
        Ok(())
    }
}

/// Lists and fetches out of one directory of the in-memory store, the
/// same way a real deployment's downloader would list and fetch out of
/// whatever directory this replica uploads into.
pub struct InMemoryDownloader {
    store: Arc<InMemoryObjectStore>,
    dir: String,
}

impl InMemoryDownloader {
    pub fn new(store: Arc<InMemoryObjectStore>, dir: impl Into<String>) -> Self {
        InMemoryDownloader { store, dir: dir.into() }
    }
}

#[async_trait]
impl Downloader for InMemoryDownloader {
    async fn list(&self) -> Result<Vec<String>, RecoverError> {
        let entries = self.store.list(&self.dir).await.map_err(|e| RecoverError::Download(e.to_string()))?;
        Ok(entries.into_keys().collect())
    }

    async fn fetch(&self, entry: &str) -> Result<Vec<u8>, RecoverError> {
        self.store
            .get(entry)
            .ok_or_else(|| RecoverError::Download(format!("no such entry: {entry}")))
    }
}
