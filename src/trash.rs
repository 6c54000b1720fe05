//! Trash lifecycle — the soft-delete state machine.
//!
//! `Active` (deletedAt = null) → `Trashed` (deletedAt stamped) → back to
//! `Active` via restore, or gone for good via purge. Trashing and restoring
//! never touch attachments; purging deletes every attachment blob before the
//! document. A restore racing a purge loses: once the document is gone the
//! restore write fails with `NotFound`.

use std::sync::Arc;

use crate::error::Result;
use crate::service::EntityService;
use crate::types::{Entity, ItemError, PurgeReport};

// ============================================================================
// TrashState
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashState {
    Active,
    Trashed,
}

impl TrashState {
    pub fn of(entity: &Entity) -> Self {
        if entity.deleted_at.is_some() {
            Self::Trashed
        } else {
            Self::Active
        }
    }
}

// ============================================================================
// Trash
// ============================================================================

/// Trash operations over one entity collection.
pub struct Trash {
    service: Arc<EntityService>,
}

impl Trash {
    pub fn new(service: Arc<EntityService>) -> Self {
        Self { service }
    }

    /// `Active -> Trashed` for one or many entities, in one atomic write.
    pub async fn trash(&self, user_id: &str, ids: &[String]) -> Result<()> {
        self.service.batch_soft_delete(user_id, ids).await
    }

    /// `Trashed -> Active`. Fails with `NotFound` if a concurrent purge
    /// already removed the document.
    pub async fn restore(&self, user_id: &str, id: &str) -> Result<()> {
        self.service.restore(user_id, id).await
    }

    /// `Trashed -> Purged`: irreversible. The UI confirms before calling this.
    pub async fn purge(&self, user_id: &str, id: &str) -> Result<()> {
        self.service.permanently_delete(user_id, id).await
    }

    /// Purge every entity currently in the trash for `user_id`.
    ///
    /// Outcomes are per item: a failing purge (or a purge whose attachment
    /// cleanup failed) is reported in the result and never aborts the rest of
    /// the batch.
    pub async fn empty(&self, user_id: &str) -> Result<PurgeReport> {
        let trashed = self.service.list_trash(user_id).await?;

        let mut report = PurgeReport::default();
        for entity in trashed {
            match self.service.purge_with_outcome(user_id, &entity.id).await {
                Ok(outcome) if outcome.is_clean() => report.purged_ids.push(entity.id),
                Ok(outcome) => {
                    let paths: Vec<String> = outcome
                        .attachment_errors
                        .iter()
                        .map(|e| e.error.clone())
                        .collect();
                    report.errors.push(ItemError {
                        id: entity.id,
                        error: format!("attachment cleanup incomplete: {}", paths.join("; ")),
                    });
                }
                Err(e) => report.errors.push(ItemError {
                    id: entity.id,
                    error: e.to_string(),
                }),
            }
        }
        Ok(report)
    }
}
