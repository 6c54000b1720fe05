//! Merged-feed tests — de-duplication precedence, slice replacement
//! semantics, and the full service wiring.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;

use space_sync::convert::{timestamp_to_wire, to_domain};
use space_sync::merge::{subscribe_merged, MergedFeed};
use space_sync::service::EntityService;
use space_sync::store::{MemoryBlobStore, MemoryStore, StaticDirectory};
use space_sync::types::{CreateEntity, Entity};

// ============================================================================
// Helpers
// ============================================================================

/// Build an entity straight from a wire document; `at` drives the recency
/// ordering.
fn entity(id: &str, owner: &str, pinned: bool, at_secs: u32) -> Entity {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, at_secs).unwrap();
    to_domain(
        id,
        &json!({
            "ownerId": owner,
            "title": id,
            "pinned": pinned,
            "updatedAt": timestamp_to_wire(at),
        }),
    )
    .unwrap()
}

fn ids(entities: &[Entity]) -> Vec<&str> {
    entities.iter().map(|e| e.id.as_str()).collect()
}

// ============================================================================
// De-duplication and ordering
// ============================================================================

#[test]
fn merge_deduplicates_with_owned_over_shared_over_space() {
    let feed = MergedFeed::new();

    let mut owned_copy = entity("dup", "u1", false, 10);
    owned_copy.title = "owned view".to_string();
    let mut shared_copy = entity("dup", "u1", false, 10);
    shared_copy.title = "shared view".to_string();

    feed.set_owned(vec![owned_copy]);
    feed.set_shared(vec![shared_copy, entity("s1", "u2", false, 5)]);
    feed.set_space(vec![entity("dup", "u1", false, 10), entity("sp1", "u3", false, 1)]);

    let merged = feed.snapshot();
    assert_eq!(ids(&merged), vec!["dup", "s1", "sp1"]);
    assert_eq!(merged[0].title, "owned view", "owned copy must win");
}

#[test]
fn merge_orders_pinned_first_then_recency() {
    let feed = MergedFeed::new();
    feed.set_owned(vec![entity("old", "u1", false, 1), entity("new", "u1", false, 30)]);
    feed.set_shared(vec![entity("pinned", "u2", true, 2)]);

    assert_eq!(ids(&feed.snapshot()), vec!["pinned", "new", "old"]);
}

#[test]
fn absent_slices_contribute_nothing() {
    let feed = MergedFeed::new();
    assert!(feed.snapshot().is_empty());

    feed.set_owned(vec![entity("a", "u1", false, 1)]);
    assert_eq!(ids(&feed.snapshot()), vec!["a"]);

    // An empty replacement is different from an absent slice but merges the
    // same way.
    feed.set_shared(Vec::new());
    assert_eq!(ids(&feed.snapshot()), vec!["a"]);
}

#[test]
fn clearing_the_space_slice_drops_its_entities() {
    let feed = MergedFeed::new();
    feed.set_owned(vec![entity("a", "u1", false, 2)]);
    feed.set_space(vec![entity("b", "u2", false, 1)]);
    assert_eq!(ids(&feed.snapshot()), vec!["a", "b"]);

    feed.clear_space();
    assert_eq!(ids(&feed.snapshot()), vec!["a"]);
}

// ============================================================================
// Listener semantics
// ============================================================================

#[test]
fn listeners_get_an_immediate_snapshot_then_every_replacement() {
    let feed = MergedFeed::new();
    feed.set_owned(vec![entity("a", "u1", false, 1)]);

    let log: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let unsub = feed.subscribe(Arc::new(move |entities| {
        sink.lock()
            .push(entities.iter().map(|e| e.id.clone()).collect());
    }));

    feed.set_shared(vec![entity("b", "u2", false, 2)]);

    {
        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], vec!["a"]);
        assert_eq!(log[1], vec!["b", "a"]);
    }

    unsub();
    feed.set_owned(Vec::new());
    assert_eq!(log.lock().len(), 2, "listener fired after unsubscribe");
}

// ============================================================================
// Service wiring
// ============================================================================

#[tokio::test]
async fn subscribe_merged_unifies_owned_shared_and_space() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let directory = Arc::new(StaticDirectory::new());
    directory.set_members("team", vec!["u1".to_string(), "u2".to_string()]);
    let service = EntityService::new(
        Arc::clone(&store) as _,
        Arc::clone(&blobs) as _,
        Arc::clone(&directory) as _,
        "notes",
    );

    // u1's own personal note, plus a team note by u2. The team note reaches
    // u1 through both the shared and the space slice and must appear once.
    let mine = service
        .create("u1", CreateEntity {
            title: "mine".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let theirs = service
        .create("u2", CreateEntity {
            title: "theirs".to_string(),
            space_id: Some("team".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let log: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let unsub = subscribe_merged(
        &service,
        "u1",
        Some("team"),
        Arc::new(move |entities| {
            sink.lock()
                .push(entities.iter().map(|e| e.id.clone()).collect());
        }),
        None,
    );

    // The consumer attaches after the slices, so the first delivery is
    // already the complete merge.
    let first = log.lock().first().cloned().unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.contains(&mine));
    assert!(first.contains(&theirs));

    // A new write re-emits through the live slices.
    service
        .create("u2", CreateEntity {
            title: "more".to_string(),
            space_id: Some("team".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let latest = log.lock().last().cloned().unwrap();
    assert_eq!(latest.len(), 3);

    unsub();
    assert_eq!(store.subscription_count(), 0);
    let seen = log.lock().len();
    service.create("u1", CreateEntity::default()).await.unwrap();
    assert_eq!(log.lock().len(), seen);
}

#[tokio::test]
async fn subscribe_merged_personal_scope_never_opens_a_space_query() {
    let store = Arc::new(MemoryStore::new());
    let service = EntityService::new(
        Arc::clone(&store) as _,
        Arc::new(MemoryBlobStore::new()) as _,
        Arc::new(StaticDirectory::new()) as _,
        "notes",
    );

    let _unsub = subscribe_merged(&service, "u1", None, Arc::new(|_| {}), None);
    assert_eq!(store.subscription_count(), 2, "owned and shared only");
}
