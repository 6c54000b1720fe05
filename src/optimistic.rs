//! Optimistic mutation controller — apply a user-visible effect to a local
//! shadow copy before the remote write resolves, reverting on failure.
//!
//! The shadow copy is UI-local state only and is never treated as durable: it
//! is discarded and replaced the moment the authoritative subscription
//! delivers a newer value (`accept_authoritative`). On a failed remote write
//! the local state is rolled back to its exact pre-mutation value and the
//! failure is logged; no automatic retry.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::patch::EntityPatch;
use crate::service::EntityService;
use crate::types::{Comment, Entity, Reaction};

// ============================================================================
// Generic optimistic-apply helper
// ============================================================================

/// Replace `state` with `next` and return a rollback closure that restores
/// the previous value. Each interaction site gets revert-for-free instead of
/// hand-rolling its own diffing.
pub fn apply_optimistic<T>(state: &Arc<Mutex<T>>, next: T) -> impl FnOnce() + Send
where
    T: Send + 'static,
{
    let previous = {
        let mut guard = state.lock();
        std::mem::replace(&mut *guard, next)
    };
    let state = Arc::clone(state);
    move || {
        *state.lock() = previous;
    }
}

/// Apply `next` optimistically, run the remote effect, and roll back if it
/// fails. Success takes no further action — the eventual subscription
/// delivery supersedes the optimistic value.
pub async fn optimistic_write<T, Fut>(state: &Arc<Mutex<T>>, next: T, effect: Fut) -> Result<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<()>>,
{
    let rollback = apply_optimistic(state, next);
    match effect.await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(error = %e, "optimistic write failed; rolling back local state");
            rollback();
            Err(e)
        }
    }
}

// ============================================================================
// OptimisticController
// ============================================================================

/// Per-entity controller for latency-sensitive interactions (reactions,
/// comments, pin toggles). Holds the UI-local shadow copy of the entity.
pub struct OptimisticController {
    service: Arc<EntityService>,
    user_id: String,
    state: Arc<Mutex<Entity>>,
}

impl OptimisticController {
    pub fn new(service: Arc<EntityService>, user_id: impl Into<String>, entity: Entity) -> Self {
        Self {
            service,
            user_id: user_id.into(),
            state: Arc::new(Mutex::new(entity)),
        }
    }

    /// Current local view of the entity.
    pub fn entity(&self) -> Entity {
        self.state.lock().clone()
    }

    /// Replace the shadow copy with an authoritative value delivered by the
    /// live subscription. Always wins over whatever is held locally.
    pub fn accept_authoritative(&self, entity: Entity) {
        *self.state.lock() = entity;
    }

    /// Toggle the caller's reaction of `kind`.
    ///
    /// Presence is decided from the **current local state** — not a separate
    /// source of truth — so the toggle is always consistent with what the
    /// user just saw.
    pub async fn toggle_reaction(&self, kind: &str) -> Result<()> {
        let next = {
            let current = self.state.lock();
            let mut reactions = current.reactions.clone();
            let existing = reactions
                .iter()
                .position(|r| r.user_id == self.user_id && r.kind == kind);
            match existing {
                Some(i) => {
                    reactions.remove(i);
                }
                None => reactions.push(Reaction {
                    user_id: self.user_id.clone(),
                    kind: kind.to_string(),
                    created_at: Utc::now(),
                }),
            }
            let mut next = current.clone();
            next.reactions = reactions;
            next
        };

        let patch = EntityPatch::new().reactions(next.reactions.clone());
        let effect = self.remote_update(patch);
        optimistic_write(&self.state, next, effect).await
    }

    /// Add a comment under a locally generated temporary id; the authoritative
    /// subscription transparently replaces it with the permanent one.
    /// Returns the temporary id.
    pub async fn add_comment(&self, body: &str) -> Result<String> {
        let temp_id = format!("local-{}", Uuid::new_v4());
        let next = {
            let current = self.state.lock();
            let mut next = current.clone();
            next.comments.push(Comment {
                id: temp_id.clone(),
                user_id: self.user_id.clone(),
                body: body.to_string(),
                created_at: Utc::now(),
            });
            next
        };

        let patch = EntityPatch::new().comments(next.comments.clone());
        let effect = self.remote_update(patch);
        optimistic_write(&self.state, next, effect).await?;
        Ok(temp_id)
    }

    /// Remove a comment by id (temporary or permanent), optimistically.
    pub async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        let next = {
            let current = self.state.lock();
            let mut next = current.clone();
            next.comments.retain(|c| c.id != comment_id);
            next
        };

        let patch = EntityPatch::new().comments(next.comments.clone());
        let effect = self.remote_update(patch);
        optimistic_write(&self.state, next, effect).await
    }

    /// Toggle-style pin flip with the same apply/rollback shape.
    pub async fn set_pinned(&self, pinned: bool) -> Result<()> {
        let next = {
            let current = self.state.lock();
            let mut next = current.clone();
            next.pinned = pinned;
            next
        };

        let patch = EntityPatch::new().pinned(pinned);
        let effect = self.remote_update(patch);
        optimistic_write(&self.state, next, effect).await
    }

    fn remote_update(&self, patch: EntityPatch) -> impl Future<Output = Result<()>> + '_ {
        let id = self.state.lock().id.clone();
        async move { self.service.update(&self.user_id, &id, patch).await }
    }
}
