//! AppDataContext — the explicit, constructed replacement for ambient store
//! singletons.
//!
//! Built once when a user signs in, passed to whatever needs data access, and
//! torn down on sign-out. Live subscription handles are registered with the
//! context so teardown reliably releases every live query and stops every
//! callback, regardless of which screen opened them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::service::EntityService;
use crate::store::{BlobStore, DocumentStore, SpaceDirectory, Unsubscribe};

pub struct AppDataContext {
    user_id: String,
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    directory: Arc<dyn SpaceDirectory>,
    services: Mutex<HashMap<String, Arc<EntityService>>>,
    live: Mutex<Vec<Unsubscribe>>,
}

impl AppDataContext {
    /// Construct on successful auth.
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        directory: Arc<dyn SpaceDirectory>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            blobs,
            directory,
            services: Mutex::new(HashMap::new()),
            live: Mutex::new(Vec::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The service for one entity collection ("notes", "habits", ...),
    /// constructed on first use and shared afterwards.
    pub fn service(&self, collection: &str) -> Arc<EntityService> {
        let mut services = self.services.lock();
        Arc::clone(services.entry(collection.to_string()).or_insert_with(|| {
            Arc::new(EntityService::new(
                Arc::clone(&self.store),
                Arc::clone(&self.blobs),
                Arc::clone(&self.directory),
                collection,
            ))
        }))
    }

    /// Register a live subscription handle for teardown.
    pub fn track(&self, unsubscribe: Unsubscribe) {
        self.live.lock().push(unsubscribe);
    }

    /// Number of tracked live subscriptions.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Release every tracked subscription and drop the context. Call on
    /// sign-out.
    pub fn teardown(self) {
        let handles: Vec<Unsubscribe> = {
            let mut live = self.live.lock();
            live.drain(..).collect()
        };
        for unsubscribe in handles {
            unsubscribe();
        }
    }
}
