//! The collaborator interface the core replication components talk to
//! instead of a concrete object-storage backend, so tests can supply an
//! in-memory fake.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::err::StoreError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads an entry under `name`. `provider` is handed rather than a
    /// pre-serialized buffer so a retrying implementation never needs the
    /// caller to re-serialize state.
    async fn upload(
        &self,
        name: &str,
        provider: &(dyn Fn() -> Vec<u8> + Send + Sync),
    ) -> Result<(), StoreError>;

    /// Creates a named reference from `dir` to an already-uploaded `child`.
    async fn link(&self, dir: &str, name: &str, child: &str) -> Result<(), StoreError>;

    /// Lists the entries directly under `dir`, mapping entry name to the
    /// child it refers to.
    async fn list(&self, dir: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Removes the named entry from `dir`.
    async fn unlink(&self, dir: &str, name: &str) -> Result<(), StoreError>;
}
