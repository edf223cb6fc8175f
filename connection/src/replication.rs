//! Wires the replication service (design component C7, from the
//! `relay_log` crate) into this crate's observer protocol, without either
//! crate depending on the other's observer-specific types.

use std::sync::Arc;

use common::store::ObjectStore;
use relay_log::ReplicationService;
use rusqlite::Connection;

use crate::err::ConnError;
use crate::observer::{Mutation, MutationObserver, MutationObserverFactory};

/// Holds the strong reference to a running `ReplicationService`; the
/// connection itself only ever sees a `Weak` to this factory, so dropping
/// the factory (and the service with it) can never be blocked by the
/// connection outliving it.
pub struct ServiceObserverFactory<S: ObjectStore> {
    service: Arc<ReplicationService<S>>,
}

impl<S: ObjectStore> ServiceObserverFactory<S> {
    pub fn new(service: Arc<ReplicationService<S>>) -> Self {
        ServiceObserverFactory { service }
    }

    pub fn service(&self) -> &Arc<ReplicationService<S>> {
        &self.service
    }
}

impl<S: ObjectStore + 'static> MutationObserverFactory for ServiceObserverFactory<S> {
    fn create(&self) -> Box<dyn MutationObserver> {
        Box::new(RelayLogObserver {
            service: Arc::clone(&self.service),
        })
    }
}

struct RelayLogObserver<S: ObjectStore> {
    service: Arc<ReplicationService<S>>,
}

impl<S: ObjectStore + 'static> MutationObserver for RelayLogObserver<S> {
    fn observed(&mut self, conn: &Connection, mutation: &Mutation) -> Result<(), ConnError> {
        for row in &mutation.rows {
            self.service
                .observe_mutation(conn, mutation.important, &mutation.statement, row)?;
        }
        Ok(())
    }
}
