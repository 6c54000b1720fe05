//! Store boundary — the traits this layer consumes.
//!
//! `DocumentStore` is the remote real-time document database (ground truth for
//! all persisted state), `BlobStore` holds attachment bytes, and
//! `SpaceDirectory` resolves space membership. All writes, reads, query
//! execution and consistency are delegated to the store; this crate only
//! merges live queries and applies optimistic UI on top.
//!
//! [`memory`] provides a complete in-process implementation used by the test
//! suite and as a reference for the subscription contract.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;

pub use memory::{MemoryBlobStore, MemoryStore, StaticDirectory};

// ============================================================================
// Documents and queries
// ============================================================================

/// A raw document as delivered by the store: opaque id plus JSON fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub fields: Value,
}

/// The live/list queries this layer issues.
///
/// The first three are "normal listing" queries and exclude soft-deleted
/// documents; `TrashedBy` returns only soft-deleted ones. Ordering is fixed:
/// `pinned desc, updatedAt desc` for listings, `deletedAt desc` for trash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityQuery {
    /// Documents with `ownerId == user`.
    OwnedBy(String),
    /// Documents whose `sharedWithUserIds` contains `user` (collection-group
    /// query on the real store).
    SharedWith(String),
    /// Documents with `spaceId == space`. The service layers an additional
    /// client-side owner exclusion on top of this query.
    InSpace(String),
    /// Soft-deleted documents with `ownerId == user`.
    TrashedBy(String),
}

// ============================================================================
// Callbacks and unsubscribe handle
// ============================================================================

/// An owned one-shot closure that removes a subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// Delivered the full current result set on every change — never deltas.
pub type SnapshotCallback = Arc<dyn Fn(Vec<RawDocument>) + Send + Sync>;

/// Receives subscription failures. Errors are routed here rather than thrown
/// into the live-query machinery, so one broken subscription cannot take down
/// the others.
pub type SubscriptionErrorCallback = Arc<dyn Fn(StoreError) + Send + Sync>;

// ============================================================================
// DocumentStore
// ============================================================================

/// The remote document store's client surface.
///
/// Writes accept sparse field maps — only the supplied keys are touched
/// (last-write-wins at field granularity). Server-timestamp sentinel values
/// (see [`crate::convert::server_timestamp`]) are resolved to the store clock
/// at commit time.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document. `Ok(None)` when it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError>;

    /// Create a document with a store-assigned id; returns the id.
    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String, StoreError>;

    /// Sparse update of an existing document. Fails with `NotFound` when the
    /// document has been hard-deleted.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Hard-delete a document. Idempotent: deleting a missing document is Ok.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Apply sparse updates to many documents as one atomic unit.
    async fn batch_update(
        &self,
        collection: &str,
        writes: Vec<(String, Map<String, Value>)>,
    ) -> Result<(), StoreError>;

    /// One-shot query read.
    async fn list(
        &self,
        collection: &str,
        query: &EntityQuery,
    ) -> Result<Vec<RawDocument>, StoreError>;

    /// Live query. `on_change` receives the full matching result set
    /// immediately and after every subsequent change; `on_error` receives
    /// store-side subscription failures.
    fn subscribe(
        &self,
        collection: &str,
        query: EntityQuery,
        on_change: SnapshotCallback,
        on_error: Option<SubscriptionErrorCallback>,
    ) -> Unsubscribe;
}

// ============================================================================
// BlobStore
// ============================================================================

/// Attachment byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload bytes and return a download URL.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Delete the blob at `path`. Deleting a missing blob is Ok.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

// ============================================================================
// SpaceDirectory
// ============================================================================

/// Resolves the current membership of a shared space.
#[async_trait]
pub trait SpaceDirectory: Send + Sync {
    async fn members(&self, space_id: &str) -> Result<Vec<String>, StoreError>;
}
