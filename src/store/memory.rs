//! In-process implementations of the store traits.
//!
//! `MemoryStore` implements the full `DocumentStore` contract — query
//! evaluation, result ordering, server-timestamp resolution, atomic batches,
//! and synchronous subscription fan-out after every committed write. The test
//! suite runs against it, and it doubles as an executable reference for what
//! this layer assumes of the real store SDK.
//!
//! Fault-injection hooks (`fail_next_update`, `fail_delete_on`,
//! `inject_subscription_error`) exist so tests can exercise rollback,
//! partial-failure, and error-routing paths deterministically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::convert::{timestamp_from_wire, timestamp_to_wire, SERVER_TIMESTAMP};
use crate::error::StoreError;

use super::{
    BlobStore, DocumentStore, EntityQuery, RawDocument, SnapshotCallback, SpaceDirectory,
    SubscriptionErrorCallback, Unsubscribe,
};

// ============================================================================
// MemoryStore
// ============================================================================

struct Subscription {
    id: u64,
    collection: String,
    query: EntityQuery,
    on_change: SnapshotCallback,
    on_error: Option<SubscriptionErrorCallback>,
}

struct StoreState {
    /// collection → (id → fields). BTreeMap keeps scans deterministic.
    docs: HashMap<String, BTreeMap<String, Value>>,
    subs: Vec<Arc<Subscription>>,
    next_sub_id: u64,
    /// `(collection, id)` pairs whose next `update` fails with `Unavailable`.
    fail_updates: HashSet<(String, String)>,
    /// Count of committed `update` calls (test hook).
    update_calls: usize,
}

/// In-memory remote document store.
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                docs: HashMap::new(),
                subs: Vec::new(),
                next_sub_id: 1,
                fail_updates: HashSet::new(),
                update_calls: 0,
            })),
        }
    }

    /// Make the next `update` of `collection/id` fail with `Unavailable`.
    pub fn fail_next_update(&self, collection: &str, id: &str) {
        self.state
            .lock()
            .fail_updates
            .insert((collection.to_string(), id.to_string()));
    }

    /// Whether a document currently exists (tombstoned or not).
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.state
            .lock()
            .docs
            .get(collection)
            .map(|c| c.contains_key(id))
            .unwrap_or(false)
    }

    /// Seed a document with explicit fields, bypassing timestamp resolution.
    /// Test hook for malformed or pre-aged documents.
    pub fn insert_raw(&self, collection: &str, id: &str, fields: Value) {
        {
            let mut st = self.state.lock();
            st.docs
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), fields);
        }
        self.notify(collection);
    }

    /// Number of live subscriptions (test hook).
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subs.len()
    }

    /// Route `error` to the `on_error` callback of every live subscription on
    /// `collection`. The subscriptions stay attached and keep delivering
    /// snapshots — a listener failure is a report, not a teardown.
    pub fn inject_subscription_error(&self, collection: &str, error: StoreError) {
        let targets: Vec<SubscriptionErrorCallback> = {
            let st = self.state.lock();
            st.subs
                .iter()
                .filter(|s| s.collection == collection)
                .filter_map(|s| s.on_error.clone())
                .collect()
        };
        for on_error in targets {
            on_error(error.clone());
        }
    }

    /// Number of committed `update` calls so far (test hook).
    pub fn update_calls(&self) -> usize {
        self.state.lock().update_calls
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Resolve server-timestamp sentinels against the store clock.
    fn resolve_sentinels(fields: &mut Map<String, Value>, now: DateTime<Utc>) {
        for value in fields.values_mut() {
            if matches!(value, Value::String(s) if s == SERVER_TIMESTAMP) {
                *value = timestamp_to_wire(now);
            }
        }
    }

    /// Deliver fresh snapshots to every subscription on `collection`.
    /// Callbacks run outside the state lock.
    fn notify(&self, collection: &str) {
        let pending: Vec<(Arc<Subscription>, Vec<RawDocument>)> = {
            let st = self.state.lock();
            st.subs
                .iter()
                .filter(|s| s.collection == collection)
                .map(|s| (Arc::clone(s), evaluate(&st, &s.collection, &s.query)))
                .collect()
        };

        for (sub, snapshot) in pending {
            (sub.on_change)(snapshot);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `query` against current state, applying the fixed result ordering.
fn evaluate(st: &StoreState, collection: &str, query: &EntityQuery) -> Vec<RawDocument> {
    let Some(docs) = st.docs.get(collection) else {
        return Vec::new();
    };

    let mut matches: Vec<RawDocument> = docs
        .iter()
        .filter(|(_, fields)| query_matches(query, fields))
        .map(|(id, fields)| RawDocument {
            id: id.clone(),
            fields: fields.clone(),
        })
        .collect();

    match query {
        EntityQuery::TrashedBy(_) => {
            matches.sort_by_key(|d| std::cmp::Reverse(wire_timestamp(&d.fields, "deletedAt")));
        }
        _ => {
            // pinned desc, updatedAt desc
            matches.sort_by_key(|d| {
                std::cmp::Reverse((
                    wire_bool(&d.fields, "pinned"),
                    wire_timestamp(&d.fields, "updatedAt"),
                ))
            });
        }
    }

    matches
}

fn query_matches(query: &EntityQuery, fields: &Value) -> bool {
    let trashed = fields
        .get("deletedAt")
        .map(|v| !v.is_null())
        .unwrap_or(false);

    match query {
        EntityQuery::OwnedBy(user) => !trashed && wire_str(fields, "ownerId") == Some(user.as_str()),
        EntityQuery::SharedWith(user) => {
            !trashed
                && fields
                    .get("sharedWithUserIds")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().any(|v| v.as_str() == Some(user.as_str())))
                    .unwrap_or(false)
        }
        EntityQuery::InSpace(space) => {
            !trashed && wire_str(fields, "spaceId") == Some(space.as_str())
        }
        EntityQuery::TrashedBy(user) => {
            trashed && wire_str(fields, "ownerId") == Some(user.as_str())
        }
    }
}

fn wire_str<'a>(fields: &'a Value, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn wire_bool(fields: &Value, key: &str) -> bool {
    fields.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn wire_timestamp(fields: &Value, key: &str) -> DateTime<Utc> {
    fields
        .get(key)
        .and_then(timestamp_from_wire)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        let st = self.state.lock();
        Ok(st
            .docs
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| RawDocument {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut fields = fields;
        Self::resolve_sentinels(&mut fields, Utc::now());
        {
            let mut st = self.state.lock();
            st.docs
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), Value::Object(fields));
        }
        self.notify(collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut fields = fields;
        Self::resolve_sentinels(&mut fields, Utc::now());
        {
            let mut st = self.state.lock();
            let key = (collection.to_string(), id.to_string());
            if st.fail_updates.remove(&key) {
                return Err(StoreError::Unavailable("injected update failure".to_string()));
            }
            let doc = st
                .docs
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            let Some(obj) = doc.as_object_mut() else {
                return Err(StoreError::Unavailable(format!(
                    "document {collection}/{id} is not an object"
                )));
            };
            for (k, v) in fields {
                obj.insert(k, v);
            }
            st.update_calls += 1;
        }
        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut st = self.state.lock();
            st.docs
                .get_mut(collection)
                .map(|c| c.remove(id).is_some())
                .unwrap_or(false)
        };
        if removed {
            self.notify(collection);
        }
        Ok(())
    }

    async fn batch_update(
        &self,
        collection: &str,
        writes: Vec<(String, Map<String, Value>)>,
    ) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        {
            let mut st = self.state.lock();

            // Validate first: a batch is all-or-nothing.
            for (id, _) in &writes {
                let exists = st
                    .docs
                    .get(collection)
                    .map(|c| c.contains_key(id))
                    .unwrap_or(false);
                if !exists {
                    return Err(StoreError::Batch(format!(
                        "document {collection}/{id} does not exist"
                    )));
                }
            }

            for (id, fields) in writes {
                let mut fields = fields;
                Self::resolve_sentinels(&mut fields, now);
                let doc = st
                    .docs
                    .get_mut(collection)
                    .and_then(|c| c.get_mut(&id))
                    .and_then(Value::as_object_mut)
                    .expect("validated above");
                for (k, v) in fields {
                    doc.insert(k, v);
                }
            }
        }
        self.notify(collection);
        Ok(())
    }

    async fn list(
        &self,
        collection: &str,
        query: &EntityQuery,
    ) -> Result<Vec<RawDocument>, StoreError> {
        let st = self.state.lock();
        Ok(evaluate(&st, collection, query))
    }

    fn subscribe(
        &self,
        collection: &str,
        query: EntityQuery,
        on_change: SnapshotCallback,
        on_error: Option<SubscriptionErrorCallback>,
    ) -> Unsubscribe {
        let (sub, initial) = {
            let mut st = self.state.lock();
            let id = st.next_sub_id;
            st.next_sub_id += 1;
            let sub = Arc::new(Subscription {
                id,
                collection: collection.to_string(),
                query,
                on_change,
                on_error,
            });
            st.subs.push(Arc::clone(&sub));
            let initial = evaluate(&st, &sub.collection, &sub.query);
            (sub, initial)
        };

        // Initial delivery of the full current result set, outside the lock.
        (sub.on_change)(initial);

        let state = Arc::clone(&self.state);
        let sub_id = sub.id;
        Box::new(move || {
            state.lock().subs.retain(|s| s.id != sub_id);
        })
    }
}

// ============================================================================
// MemoryBlobStore
// ============================================================================

struct BlobState {
    blobs: HashMap<String, (Vec<u8>, String)>,
    fail_deletes: HashSet<String>,
    deleted_paths: Vec<String>,
}

/// In-memory blob store with deterministic delete-failure injection.
pub struct MemoryBlobStore {
    state: Mutex<BlobState>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BlobState {
                blobs: HashMap::new(),
                fail_deletes: HashSet::new(),
                deleted_paths: Vec::new(),
            }),
        }
    }

    /// Make every `delete` of `path` fail until cleared.
    pub fn fail_delete_on(&self, path: &str) {
        self.state.lock().fail_deletes.insert(path.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().blobs.contains_key(path)
    }

    /// Paths successfully deleted so far, in order (test hook).
    pub fn deleted_paths(&self) -> Vec<String> {
        self.state.lock().deleted_paths.clone()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        self.state
            .lock()
            .blobs
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{path}"))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut st = self.state.lock();
        if st.fail_deletes.contains(path) {
            return Err(StoreError::blob(path, "injected delete failure"));
        }
        st.blobs.remove(path);
        st.deleted_paths.push(path.to_string());
        Ok(())
    }
}

// ============================================================================
// StaticDirectory
// ============================================================================

/// Space membership directory backed by a plain map. Unknown spaces resolve
/// to an empty member list.
pub struct StaticDirectory {
    members: Mutex<HashMap<String, Vec<String>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_members(&self, space_id: &str, members: Vec<String>) {
        self.members
            .lock()
            .insert(space_id.to_string(), members);
    }
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpaceDirectory for StaticDirectory {
    async fn members(&self, space_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .members
            .lock()
            .get(space_id)
            .cloned()
            .unwrap_or_default())
    }
}
