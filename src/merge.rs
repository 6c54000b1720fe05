//! Subscription merger — fans up to three live slices (owned, shared, space)
//! into one materialized, de-duplicated collection.
//!
//! Each slice delivers a **complete replacement** of its result set on every
//! update, never deltas. The merged output is `owned ∪ shared ∪ space`,
//! de-duplicated by id with precedence `owned > shared > space` (the same
//! entity can transiently appear in more than one slice while the store's
//! independent queries catch up with each other). Any subset of slices may be
//! absent — a personal scope simply never attaches a space slice.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::service::{EntityCallback, EntityService};
use crate::store::{SubscriptionErrorCallback, Unsubscribe};
use crate::types::Entity;

// ============================================================================
// MergedFeed
// ============================================================================

/// Listener callback — receives the merged snapshot after every slice change.
pub type FeedCallback = Arc<dyn Fn(&[Entity]) + Send + Sync>;

struct FeedState {
    owned: Option<Vec<Entity>>,
    shared: Option<Vec<Entity>>,
    space: Option<Vec<Entity>>,
    listeners: Vec<(u64, FeedCallback)>,
    next_id: u64,
}

impl FeedState {
    /// Union in precedence order, first occurrence of an id wins.
    fn merged(&self) -> Vec<Entity> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out: Vec<Entity> = Vec::new();

        for slice in [&self.owned, &self.shared, &self.space] {
            let Some(entities) = slice else { continue };
            for entity in entities {
                if seen.insert(entity.id.as_str()) {
                    out.push(entity.clone());
                }
            }
        }

        // pinned desc, updatedAt desc — matches the per-slice store ordering.
        out.sort_by_key(|e| std::cmp::Reverse((e.pinned, e.updated_at)));
        out
    }
}

/// Reactive merge operator over the owned/shared/space slices.
pub struct MergedFeed {
    state: Arc<Mutex<FeedState>>,
}

impl MergedFeed {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState {
                owned: None,
                shared: None,
                space: None,
                listeners: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Register a listener; it immediately receives the current merged
    /// snapshot, then again after every slice replacement.
    pub fn subscribe(&self, callback: FeedCallback) -> Unsubscribe {
        let (id, initial) = {
            let mut st = self.state.lock();
            let id = st.next_id;
            st.next_id += 1;
            st.listeners.push((id, Arc::clone(&callback)));
            (id, st.merged())
        };
        callback(&initial);

        let state = Arc::clone(&self.state);
        Box::new(move || {
            state.lock().listeners.retain(|(lid, _)| *lid != id);
        })
    }

    /// Replace the owned slice with a complete new result set.
    pub fn set_owned(&self, entities: Vec<Entity>) {
        self.replace(|st| st.owned = Some(entities));
    }

    /// Replace the shared slice.
    pub fn set_shared(&self, entities: Vec<Entity>) {
        self.replace(|st| st.shared = Some(entities));
    }

    /// Replace the space slice.
    pub fn set_space(&self, entities: Vec<Entity>) {
        self.replace(|st| st.space = Some(entities));
    }

    /// Drop the space slice entirely (scope changed to personal).
    pub fn clear_space(&self) {
        self.replace(|st| st.space = None);
    }

    /// Current merged view.
    pub fn snapshot(&self) -> Vec<Entity> {
        self.state.lock().merged()
    }

    /// Apply a slice mutation, then notify every listener with the fresh
    /// merge. Listener callbacks run outside the lock.
    fn replace(&self, mutate: impl FnOnce(&mut FeedState)) {
        let (listeners, merged) = {
            let mut st = self.state.lock();
            mutate(&mut st);
            let listeners: Vec<FeedCallback> =
                st.listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            (listeners, st.merged())
        };
        for cb in listeners {
            cb(&merged);
        }
    }
}

impl Default for MergedFeed {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Service wiring
// ============================================================================

/// Wire the owned, shared and (for a shared scope) space subscriptions of
/// `service` into one merged feed, delivering the merged snapshot to
/// `on_change`. Returns a single handle that tears down every underlying
/// subscription.
pub fn subscribe_merged(
    service: &EntityService,
    user_id: &str,
    space_id: Option<&str>,
    on_change: EntityCallback,
    on_error: Option<SubscriptionErrorCallback>,
) -> Unsubscribe {
    let feed = Arc::new(MergedFeed::new());

    let mut unsubs: Vec<Unsubscribe> = Vec::new();

    {
        let feed = Arc::clone(&feed);
        unsubs.push(service.subscribe_owned(
            user_id,
            Arc::new(move |entities| feed.set_owned(entities)),
            on_error.clone(),
        ));
    }
    {
        let feed = Arc::clone(&feed);
        unsubs.push(service.subscribe_shared(
            user_id,
            Arc::new(move |entities| feed.set_shared(entities)),
            on_error.clone(),
        ));
    }
    {
        let feed = Arc::clone(&feed);
        unsubs.push(service.subscribe_space(
            space_id,
            user_id,
            Arc::new(move |entities| feed.set_space(entities)),
            on_error,
        ));
    }

    // Attach the consumer last so it sees one coherent snapshot instead of
    // three partial build-up emissions.
    unsubs.push(feed.subscribe(Arc::new(move |entities| on_change(entities.to_vec()))));

    Box::new(move || {
        for unsub in unsubs {
            unsub();
        }
    })
}
