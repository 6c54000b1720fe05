//! Autosave debouncer — bounds remote-write frequency during continuous
//! typing.
//!
//! Each tracked field (title, body) has its own independently tunable delay
//! and its own timer, so a fast title edit is never held hostage by a slow
//! body edit. Every edit supersedes the previous pending timer (generation
//! counter); only the timer that survives its full delay flushes, writing
//! exactly the one field it tracks through `EntityService::update`.
//!
//! A failed flush is logged, never retried automatically: the pending value
//! stays local, and the next edit naturally re-triggers the debounce cycle.
//!
//! `edit` spawns its timer on the ambient tokio runtime and must be called
//! from within one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::patch::EntityPatch;
use crate::service::EntityService;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedField {
    Title,
    Body,
}

/// Per-field debounce delays. Title flushes faster than body — short inputs
/// settle quickly, long-form typing coalesces harder.
#[derive(Debug, Clone, Copy)]
pub struct AutosaveConfig {
    pub title_delay: Duration,
    pub body_delay: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            title_delay: Duration::from_millis(600),
            body_delay: Duration::from_millis(1500),
        }
    }
}

impl AutosaveConfig {
    fn delay(&self, field: TrackedField) -> Duration {
        match field {
            TrackedField::Title => self.title_delay,
            TrackedField::Body => self.body_delay,
        }
    }
}

/// Save-status callback: `true` while at least one flush is in flight.
pub type SavingCallback = Arc<dyn Fn(bool) + Send + Sync>;

// ============================================================================
// AutosaveDebouncer
// ============================================================================

struct FieldSlot {
    /// Last value known to be persisted remotely.
    last_persisted: String,
    /// Edited value awaiting flush, if any.
    pending: Option<String>,
    /// Bumped on every edit; a timer only flushes if its generation is still
    /// current when it fires.
    generation: u64,
}

pub struct AutosaveDebouncer {
    service: Arc<EntityService>,
    user_id: String,
    entity_id: String,
    config: AutosaveConfig,
    slots: Arc<Mutex<HashMap<TrackedField, FieldSlot>>>,
    /// Number of flushes currently in flight.
    in_flight: Arc<AtomicUsize>,
    disposed: Arc<AtomicBool>,
    on_saving: Option<SavingCallback>,
}

impl AutosaveDebouncer {
    /// `title`/`body` seed the last-persisted baselines so that re-entering
    /// the current value is recognized as a no-op.
    pub fn new(
        service: Arc<EntityService>,
        user_id: impl Into<String>,
        entity_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        config: AutosaveConfig,
        on_saving: Option<SavingCallback>,
    ) -> Self {
        let mut slots = HashMap::new();
        slots.insert(
            TrackedField::Title,
            FieldSlot {
                last_persisted: title.into(),
                pending: None,
                generation: 0,
            },
        );
        slots.insert(
            TrackedField::Body,
            FieldSlot {
                last_persisted: body.into(),
                pending: None,
                generation: 0,
            },
        );

        Self {
            service,
            user_id: user_id.into(),
            entity_id: entity_id.into(),
            config,
            slots: Arc::new(Mutex::new(slots)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(AtomicBool::new(false)),
            on_saving,
        }
    }

    /// Record a local edit. Equal-to-persisted values cancel any pending
    /// flush; anything else (re)starts the field's delay timer.
    pub fn edit(&self, field: TrackedField, value: &str) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let generation = {
            let mut slots = self.slots.lock();
            let slot = slots.get_mut(&field).expect("all fields pre-seeded");
            slot.generation += 1;
            if value == slot.last_persisted {
                slot.pending = None;
                return;
            }
            slot.pending = Some(value.to_string());
            slot.generation
        };

        let delay = self.config.delay(field);
        let service = Arc::clone(&self.service);
        let user_id = self.user_id.clone();
        let entity_id = self.entity_id.clone();
        let slots = Arc::clone(&self.slots);
        let in_flight = Arc::clone(&self.in_flight);
        let disposed = Arc::clone(&self.disposed);
        let on_saving = self.on_saving.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if disposed.load(Ordering::SeqCst) {
                return;
            }

            // Superseded by a newer edit? Then that edit's timer owns the flush.
            let value = {
                let slots = slots.lock();
                let slot = slots.get(&field).expect("all fields pre-seeded");
                if slot.generation != generation {
                    return;
                }
                match &slot.pending {
                    Some(v) => v.clone(),
                    None => return,
                }
            };

            if in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(cb) = &on_saving {
                    cb(true);
                }
            }

            let patch = match field {
                TrackedField::Title => EntityPatch::new().title(value.clone()),
                TrackedField::Body => EntityPatch::new().body(value.clone()),
            };
            let result = service.update(&user_id, &entity_id, patch).await;

            match result {
                Ok(()) => {
                    let mut slots = slots.lock();
                    let slot = slots.get_mut(&field).expect("all fields pre-seeded");
                    if slot.generation == generation {
                        slot.last_persisted = value;
                        slot.pending = None;
                    }
                }
                Err(e) => {
                    // The pending value stays local; the next edit retries.
                    tracing::warn!(
                        entity = %entity_id,
                        field = ?field,
                        error = %e,
                        "autosave flush failed"
                    );
                }
            }

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                if let Some(cb) = &on_saving {
                    cb(false);
                }
            }
        });
    }

    /// True while at least one flush is in flight.
    pub fn is_saving(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// The field's edited-but-unflushed value, if any.
    pub fn pending(&self, field: TrackedField) -> Option<String> {
        self.slots
            .lock()
            .get(&field)
            .and_then(|s| s.pending.clone())
    }

    /// The last value known to be persisted for the field.
    pub fn last_persisted(&self, field: TrackedField) -> String {
        self.slots
            .lock()
            .get(&field)
            .map(|s| s.last_persisted.clone())
            .unwrap_or_default()
    }

    /// Cancel all pending timers. Call on unmount so a stale write cannot
    /// fire after the editor is gone.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let mut slots = self.slots.lock();
        for slot in slots.values_mut() {
            slot.generation += 1;
            slot.pending = None;
        }
    }
}
