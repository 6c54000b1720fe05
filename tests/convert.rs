//! Entity converter tests — wire ↔ domain mapping, presence semantics, and
//! timestamp coercion.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use space_sync::convert::{
    entity_to_wire, patch_to_wire, server_timestamp, timestamp_from_wire, timestamp_to_wire,
    to_domain, SERVER_TIMESTAMP,
};
use space_sync::error::ConvertError;
use space_sync::patch::EntityPatch;
use space_sync::types::{Attachment, EntityKind};

// ============================================================================
// Timestamps
// ============================================================================

#[test]
fn timestamp_round_trips_through_native_shape() {
    let ts = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
    let wire = timestamp_to_wire(ts);
    assert_eq!(wire.get("seconds").and_then(Value::as_i64), Some(ts.timestamp()));
    assert_eq!(timestamp_from_wire(&wire), Some(ts));
}

#[test]
fn timestamp_accepts_rfc3339_strings() {
    let parsed = timestamp_from_wire(&json!("2024-05-17T09:30:00Z")).unwrap();
    assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap());
}

#[test]
fn timestamp_rejects_garbage() {
    assert_eq!(timestamp_from_wire(&json!(42)), None);
    assert_eq!(timestamp_from_wire(&json!("not a date")), None);
    assert_eq!(timestamp_from_wire(&json!({"sec": 1})), None);
}

// ============================================================================
// Raw → domain
// ============================================================================

#[test]
fn absent_fields_default_to_empty_values() {
    let entity = to_domain("n1", &json!({ "ownerId": "u1" })).unwrap();
    assert_eq!(entity.id, "n1");
    assert_eq!(entity.owner_id, "u1");
    assert_eq!(entity.title, "");
    assert_eq!(entity.body, "");
    assert!(entity.space_id.is_none());
    assert!(!entity.pinned);
    assert!(!entity.archived);
    assert!(entity.label_ids.is_empty());
    assert!(entity.shared_with_user_ids.is_empty());
    assert!(entity.attachments.is_empty());
    assert!(entity.deleted_at.is_none());
    assert_eq!(entity.kind, EntityKind::Text);
}

#[test]
fn null_space_and_empty_space_read_as_personal() {
    let a = to_domain("n1", &json!({"spaceId": null})).unwrap();
    let b = to_domain("n2", &json!({"spaceId": ""})).unwrap();
    assert!(a.space_id.is_none());
    assert!(b.space_id.is_none());
}

#[test]
fn deleted_at_timestamp_marks_trashed() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let entity = to_domain("n1", &json!({"deletedAt": timestamp_to_wire(ts)})).unwrap();
    assert_eq!(entity.deleted_at, Some(ts));
    assert!(!entity.is_active());
}

#[test]
fn wrong_type_title_is_an_error() {
    let err = to_domain("n1", &json!({"title": 7})).unwrap_err();
    assert!(matches!(err, ConvertError::WrongType { ref field, .. } if field == "title"));
}

#[test]
fn malformed_timestamp_is_an_error() {
    let err = to_domain("n1", &json!({"createdAt": "yesterday-ish"})).unwrap_err();
    assert!(matches!(err, ConvertError::BadTimestamp { ref field, .. } if field == "createdAt"));
}

#[test]
fn nested_attachments_parse_with_camel_case_names() {
    let raw = json!({
        "attachments": [{
            "id": "a1",
            "storagePath": "attachments/u1/a1.png",
            "downloadURL": "https://files.example/a1",
            "contentType": "image/png",
            "size": 123
        }]
    });
    let entity = to_domain("n1", &raw).unwrap();
    assert_eq!(entity.attachments.len(), 1);
    assert_eq!(entity.attachments[0].storage_path, "attachments/u1/a1.png");
    assert_eq!(entity.attachments[0].size, 123);
}

// ============================================================================
// Patch → wire: exact-keys property
// ============================================================================

#[test]
fn patch_to_wire_contains_exactly_the_set_keys() {
    let patch = EntityPatch::new().title("Hi").pinned(true);
    let wire = patch_to_wire(&patch);

    let mut keys: Vec<&str> = wire.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["pinned", "title"]);
    assert_eq!(wire.get("title"), Some(&json!("Hi")));
    assert_eq!(wire.get("pinned"), Some(&json!(true)));
}

#[test]
fn empty_patch_serializes_to_nothing() {
    assert!(patch_to_wire(&EntityPatch::new()).is_empty());
}

#[test]
fn space_move_to_personal_writes_explicit_null() {
    let wire = patch_to_wire(&EntityPatch::new().space_id(None));
    assert_eq!(wire.get("spaceId"), Some(&Value::Null));
}

#[test]
fn no_wire_value_is_ever_missing_for_a_set_field() {
    // Every Set field must materialize as a key, even when the value is the
    // type's empty value.
    let patch = EntityPatch::new()
        .title("")
        .label_ids(Vec::new())
        .attachments(Vec::new());
    let wire = patch_to_wire(&patch);
    assert_eq!(wire.get("title"), Some(&json!("")));
    assert_eq!(wire.get("labelIds"), Some(&json!([])));
    assert_eq!(wire.get("attachments"), Some(&json!([])));
}

// ============================================================================
// Domain → wire → domain round trip
// ============================================================================

#[test]
fn create_wire_round_trips_modulo_server_timestamps() {
    let mut entity = to_domain("n1", &json!({ "ownerId": "u1" })).unwrap();
    entity.title = "Groceries".to_string();
    entity.kind = EntityKind::Checklist;
    entity.space_id = Some("team".to_string());
    entity.shared_with_user_ids = vec!["u2".to_string()];
    entity.attachments = vec![Attachment {
        id: "a1".to_string(),
        storage_path: "p/a1".to_string(),
        download_url: "memory://p/a1".to_string(),
        content_type: "image/png".to_string(),
        size: 9,
    }];

    let mut wire = entity_to_wire(&entity);
    // Server assigns these at commit time; substitute concrete values so the
    // document parses back.
    assert_eq!(wire.get("createdAt"), Some(&server_timestamp()));
    assert_eq!(wire.get("updatedAt"), Some(&Value::String(SERVER_TIMESTAMP.to_string())));
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    wire.insert("createdAt".to_string(), timestamp_to_wire(now));
    wire.insert("updatedAt".to_string(), timestamp_to_wire(now));

    let back = to_domain("n1", &Value::Object(wire)).unwrap();
    assert_eq!(back.title, entity.title);
    assert_eq!(back.kind, entity.kind);
    assert_eq!(back.space_id, entity.space_id);
    assert_eq!(back.shared_with_user_ids, entity.shared_with_user_ids);
    assert_eq!(back.attachments, entity.attachments);
    assert!(back.deleted_at.is_none());
}
