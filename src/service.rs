//! EntityService — typed CRUD + subscription surface over the remote store.
//!
//! One service instance per entity collection (notes, docs, habits, ...). The
//! service is the sole writer of persisted entity state: every mutation goes
//! through the converter as a sparse wire write with a refreshed `updatedAt`,
//! and the denormalized `sharedWithUserIds` invariant is maintained here on
//! create, space moves, and via `migrate_space_sharing`.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::convert::{entity_to_wire, patch_to_wire, server_timestamp, to_domain};
use crate::error::{Result, StoreError};
use crate::patch::{EntityPatch, Field};
use crate::store::{
    BlobStore, DocumentStore, EntityQuery, RawDocument, SpaceDirectory, SubscriptionErrorCallback,
    Unsubscribe,
};
use crate::types::{is_personal_space, CreateEntity, Entity, EntityKind, ItemError, PurgeOutcome};

/// Delivered the full converted result set on every change.
pub type EntityCallback = Arc<dyn Fn(Vec<Entity>) + Send + Sync>;

// ============================================================================
// EntityService
// ============================================================================

pub struct EntityService {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    directory: Arc<dyn SpaceDirectory>,
    collection: String,
}

impl EntityService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        directory: Arc<dyn SpaceDirectory>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            blobs,
            directory,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Live query over the caller's own active entities, ordered
    /// `pinned desc, updatedAt desc`.
    pub fn subscribe_owned(
        &self,
        user_id: &str,
        on_change: EntityCallback,
        on_error: Option<SubscriptionErrorCallback>,
    ) -> Unsubscribe {
        self.subscribe_converted(EntityQuery::OwnedBy(user_id.to_string()), on_change, on_error)
    }

    /// Live query over active entities shared with the caller via space
    /// membership.
    pub fn subscribe_shared(
        &self,
        user_id: &str,
        on_change: EntityCallback,
        on_error: Option<SubscriptionErrorCallback>,
    ) -> Unsubscribe {
        self.subscribe_converted(
            EntityQuery::SharedWith(user_id.to_string()),
            on_change,
            on_error,
        )
    }

    /// Live query over a space's active entities, excluding the caller's own
    /// (those already arrive through the owned subscription).
    ///
    /// For a personal/absent space this is a no-op: an empty result is
    /// delivered immediately and no live query is opened.
    pub fn subscribe_space(
        &self,
        space_id: Option<&str>,
        user_id: &str,
        on_change: EntityCallback,
        on_error: Option<SubscriptionErrorCallback>,
    ) -> Unsubscribe {
        if is_personal_space(space_id) {
            on_change(Vec::new());
            return Box::new(|| {});
        }
        let space_id = space_id.expect("non-personal space id").to_string();

        let collection = self.collection.clone();
        let user = user_id.to_string();
        let raw_cb: Arc<dyn Fn(Vec<RawDocument>) + Send + Sync> = Arc::new(move |docs| {
            let mut entities = docs_to_entities(&collection, docs);
            entities.retain(|e| e.owner_id != user);
            on_change(entities);
        });
        self.store.subscribe(
            &self.collection,
            EntityQuery::InSpace(space_id),
            raw_cb,
            on_error,
        )
    }

    /// Live query over the caller's soft-deleted entities, newest deletion
    /// first.
    pub fn subscribe_trash(
        &self,
        user_id: &str,
        on_change: EntityCallback,
        on_error: Option<SubscriptionErrorCallback>,
    ) -> Unsubscribe {
        self.subscribe_converted(
            EntityQuery::TrashedBy(user_id.to_string()),
            on_change,
            on_error,
        )
    }

    fn subscribe_converted(
        &self,
        query: EntityQuery,
        on_change: EntityCallback,
        on_error: Option<SubscriptionErrorCallback>,
    ) -> Unsubscribe {
        let collection = self.collection.clone();
        let raw_cb: Arc<dyn Fn(Vec<RawDocument>) + Send + Sync> = Arc::new(move |docs| {
            on_change(docs_to_entities(&collection, docs));
        });
        self.store.subscribe(&self.collection, query, raw_cb, on_error)
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Create an entity and return its store-assigned id.
    ///
    /// `kind` defaults by payload shape (a non-empty checklist implies a
    /// checklist entity). When `space_id` denotes a shared space, current
    /// membership is resolved and `sharedWithUserIds` is set to everyone but
    /// the creator.
    pub async fn create(&self, user_id: &str, input: CreateEntity) -> Result<String> {
        let kind = input.kind.unwrap_or(if input.checklist.is_empty() {
            EntityKind::Text
        } else {
            EntityKind::Checklist
        });

        let shared_with = if is_personal_space(input.space_id.as_deref()) {
            Vec::new()
        } else {
            let space = input.space_id.as_deref().expect("non-personal space id");
            members_excluding(&*self.directory, space, user_id).await?
        };

        let entity = Entity {
            id: String::new(),
            owner_id: user_id.to_string(),
            space_id: input.space_id,
            kind,
            title: input.title,
            body: input.body,
            checklist: input.checklist,
            pinned: input.pinned,
            archived: false,
            label_ids: input.label_ids,
            shared_with_user_ids: shared_with,
            attachments: input.attachments,
            reactions: Vec::new(),
            comments: Vec::new(),
            created_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH, // replaced by server sentinel
            updated_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            deleted_at: None,
        };

        let id = self.store.add(&self.collection, entity_to_wire(&entity)).await?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Sparse update: writes exactly the supplied fields plus a refreshed
    /// `updatedAt`.
    ///
    /// Moving to a shared space recomputes `sharedWithUserIds` from that
    /// space's membership (minus the entity owner). Moving to personal clears
    /// it, unless the patch explicitly supplies a replacement.
    pub async fn update(&self, _user_id: &str, id: &str, patch: EntityPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let patch = self.resolve_sharing(id, patch).await?;
        let mut fields = patch_to_wire(&patch);
        fields.insert("updatedAt".to_string(), server_timestamp());
        self.store.update(&self.collection, id, fields).await?;
        Ok(())
    }

    async fn resolve_sharing(&self, id: &str, mut patch: EntityPatch) -> Result<EntityPatch> {
        let Field::Set(space) = patch.space_id.clone() else {
            return Ok(patch);
        };

        if is_personal_space(space.as_deref()) {
            if !patch.shared_with_user_ids.is_set() {
                patch.shared_with_user_ids = Field::Set(Vec::new());
            }
            return Ok(patch);
        }

        // Shared target: recompute from membership minus the entity owner.
        let owner = self.get(id).await?.owner_id;
        let space = space.expect("non-personal space id");
        patch.shared_with_user_ids =
            Field::Set(members_excluding(&*self.directory, &space, &owner).await?);
        Ok(patch)
    }

    // -----------------------------------------------------------------------
    // Trash transitions
    // -----------------------------------------------------------------------

    /// Stamp `deletedAt` — the entity disappears from normal listing views
    /// but keeps its document and attachments.
    pub async fn soft_delete(&self, _user_id: &str, id: &str) -> Result<()> {
        self.store
            .update(&self.collection, id, trash_stamp(true))
            .await?;
        Ok(())
    }

    /// Clear `deletedAt`. Fails with `NotFound` if the entity has been purged
    /// in the meantime — a permanent delete wins the race.
    pub async fn restore(&self, _user_id: &str, id: &str) -> Result<()> {
        self.store
            .update(&self.collection, id, trash_stamp(false))
            .await?;
        Ok(())
    }

    /// Irreversibly remove the entity: attempt deletion of every attachment
    /// blob, then delete the document.
    ///
    /// Attachment deletions are best-effort — a failing blob delete is logged
    /// and never blocks the document deletion, but the document is only
    /// removed after every deletion has been attempted.
    pub async fn permanently_delete(&self, user_id: &str, id: &str) -> Result<()> {
        self.purge_with_outcome(user_id, id).await?;
        Ok(())
    }

    /// `permanently_delete` with the attachment-cleanup outcome surfaced, so
    /// bulk trash emptying can report per-item partial failure.
    pub async fn purge_with_outcome(&self, _user_id: &str, id: &str) -> Result<PurgeOutcome> {
        let mut outcome = PurgeOutcome::default();

        let Some(doc) = self.store.get(&self.collection, id).await? else {
            // Already gone — purge is idempotent.
            return Ok(outcome);
        };

        match to_domain(&doc.id, &doc.fields) {
            Ok(entity) => {
                for attachment in &entity.attachments {
                    if attachment.storage_path.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.blobs.delete(&attachment.storage_path).await {
                        tracing::warn!(
                            collection = %self.collection,
                            id = %id,
                            path = %attachment.storage_path,
                            error = %e,
                            "attachment cleanup failed; continuing with document delete"
                        );
                        outcome.attachment_errors.push(ItemError {
                            id: attachment.id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    collection = %self.collection,
                    id = %id,
                    error = %e,
                    "unreadable document during purge; skipping attachment cleanup"
                );
            }
        }

        self.store.delete(&self.collection, id).await?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------------

    /// Apply the same sparse update to many entities in one atomic
    /// multi-document write.
    pub async fn batch_update(&self, user_id: &str, ids: &[String], patch: EntityPatch) -> Result<()> {
        if ids.is_empty() || patch.is_empty() {
            return Ok(());
        }

        let mut patch = patch;
        if let Field::Set(space) = patch.space_id.clone() {
            if is_personal_space(space.as_deref()) {
                if !patch.shared_with_user_ids.is_set() {
                    patch.shared_with_user_ids = Field::Set(Vec::new());
                }
            } else {
                let space = space.expect("non-personal space id");
                patch.shared_with_user_ids =
                    Field::Set(members_excluding(&*self.directory, &space, user_id).await?);
            }
        }

        let mut fields = patch_to_wire(&patch);
        fields.insert("updatedAt".to_string(), server_timestamp());

        let writes = ids.iter().map(|id| (id.clone(), fields.clone())).collect();
        self.store.batch_update(&self.collection, writes).await?;
        Ok(())
    }

    /// Soft-delete many entities in one atomic multi-document write.
    pub async fn batch_soft_delete(&self, _user_id: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let writes = ids
            .iter()
            .map(|id| (id.clone(), trash_stamp(true)))
            .collect();
        self.store.batch_update(&self.collection, writes).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    /// Set-union on the attachments array, keyed by attachment id. No-op on
    /// empty input.
    pub async fn add_attachments(
        &self,
        _user_id: &str,
        id: &str,
        new: Vec<crate::types::Attachment>,
    ) -> Result<()> {
        if new.is_empty() {
            return Ok(());
        }
        let entity = self.get(id).await?;
        let mut attachments = entity.attachments;
        for attachment in new {
            if !attachments.iter().any(|a| a.id == attachment.id) {
                attachments.push(attachment);
            }
        }
        self.write_attachments(id, attachments).await
    }

    /// Set-difference on the attachments array by attachment id. No-op on
    /// empty input. Blob cleanup is deferred to permanent delete.
    pub async fn remove_attachments(
        &self,
        _user_id: &str,
        id: &str,
        attachment_ids: &[String],
    ) -> Result<()> {
        if attachment_ids.is_empty() {
            return Ok(());
        }
        let entity = self.get(id).await?;
        let mut attachments = entity.attachments;
        attachments.retain(|a| !attachment_ids.contains(&a.id));
        self.write_attachments(id, attachments).await
    }

    async fn write_attachments(
        &self,
        id: &str,
        attachments: Vec<crate::types::Attachment>,
    ) -> Result<()> {
        let patch = EntityPatch::new().attachments(attachments);
        let mut fields = patch_to_wire(&patch);
        fields.insert("updatedAt".to_string(), server_timestamp());
        self.store.update(&self.collection, id, fields).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sharing reconciliation
    // -----------------------------------------------------------------------

    /// Repair `sharedWithUserIds` on every entity the caller owns in `space`:
    /// any current member (other than the owner) missing from the denormalized
    /// list is unioned in. Returns the number of entities touched.
    ///
    /// Used after membership changes to bring pre-existing entities back in
    /// line with the sharing invariant.
    pub async fn migrate_space_sharing(&self, user_id: &str, space_id: &str) -> Result<usize> {
        if is_personal_space(Some(space_id)) {
            return Ok(0);
        }

        let expected = members_excluding(&*self.directory, space_id, user_id).await?;
        let docs = self
            .store
            .list(&self.collection, &EntityQuery::InSpace(space_id.to_string()))
            .await?;

        let mut writes: Vec<(String, Map<String, Value>)> = Vec::new();
        for doc in docs {
            let entity = match to_domain(&doc.id, &doc.fields) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(
                        collection = %self.collection,
                        id = %doc.id,
                        error = %e,
                        "skipping unreadable document during sharing migration"
                    );
                    continue;
                }
            };
            if entity.owner_id != user_id {
                continue;
            }

            let missing: Vec<String> = expected
                .iter()
                .filter(|m| !entity.shared_with_user_ids.contains(m))
                .cloned()
                .collect();
            if missing.is_empty() {
                continue;
            }

            let mut shared = entity.shared_with_user_ids;
            shared.extend(missing);
            let patch = EntityPatch::new().shared_with_user_ids(shared);
            let mut fields = patch_to_wire(&patch);
            fields.insert("updatedAt".to_string(), server_timestamp());
            writes.push((entity.id, fields));
        }

        let count = writes.len();
        if count > 0 {
            self.store.batch_update(&self.collection, writes).await?;
        }
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch one entity (trashed or not).
    pub async fn get(&self, id: &str) -> Result<Entity> {
        let doc = self
            .store
            .get(&self.collection, id)
            .await?
            .ok_or_else(|| StoreError::not_found(&self.collection, id))?;
        Ok(to_domain(&doc.id, &doc.fields)?)
    }

    /// One-shot read of the caller's trashed entities.
    pub async fn list_trash(&self, user_id: &str) -> Result<Vec<Entity>> {
        let docs = self
            .store
            .list(&self.collection, &EntityQuery::TrashedBy(user_id.to_string()))
            .await?;
        Ok(docs_to_entities(&self.collection, docs))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Soft-delete stamp (or its inverse): `deletedAt` plus refreshed `updatedAt`.
fn trash_stamp(trashed: bool) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(
        "deletedAt".to_string(),
        if trashed { server_timestamp() } else { Value::Null },
    );
    fields.insert("updatedAt".to_string(), server_timestamp());
    fields
}

async fn members_excluding(
    directory: &dyn SpaceDirectory,
    space_id: &str,
    excluded: &str,
) -> Result<Vec<String>, StoreError> {
    let mut members = directory.members(space_id).await?;
    members.retain(|m| m != excluded);
    Ok(members)
}

/// Convert raw documents, dropping (and logging) any that fail to parse so one
/// malformed document cannot take down a whole feed.
fn docs_to_entities(collection: &str, docs: Vec<RawDocument>) -> Vec<Entity> {
    docs.into_iter()
        .filter_map(|doc| match to_domain(&doc.id, &doc.fields) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(collection, id = %doc.id, error = %e, "dropping unreadable document from snapshot");
                None
            }
        })
        .collect()
}
