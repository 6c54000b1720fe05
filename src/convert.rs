//! Entity converter — pure mapping between the store's raw document shape and
//! the in-memory domain entity.
//!
//! Wire documents are JSON objects with camelCase keys. Timestamps on the wire
//! are either the store's native `{seconds, nanos}` map or an RFC 3339 string;
//! both coerce to `chrono::DateTime<Utc>`. Fields absent in a raw document
//! default to type-appropriate empty values (`""`, `[]`, `false`, null) — the
//! store rejects undefined values in writes, so the wire side never emits a
//! key it was not given.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ConvertError;
use crate::patch::{EntityPatch, Field};
use crate::types::{Entity, EntityKind};

/// Sentinel value resolved to the server's clock at write time.
pub const SERVER_TIMESTAMP: &str = "__server_timestamp__";

/// Wire value requesting a server-assigned timestamp.
pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP.to_string())
}

// ============================================================================
// Timestamps
// ============================================================================

/// Serialize a timestamp in the store's native `{seconds, nanos}` shape.
pub fn timestamp_to_wire(ts: DateTime<Utc>) -> Value {
    json!({
        "seconds": ts.timestamp(),
        "nanos": ts.timestamp_subsec_nanos(),
    })
}

/// Coerce a wire timestamp to `DateTime<Utc>`.
///
/// Accepts the native `{seconds, nanos}` map and RFC 3339 strings (the shape
/// the store's export tooling emits). Returns `None` for null/absent and for
/// unreadable values — callers decide whether that is an error.
pub fn timestamp_from_wire(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map.get("nanos").and_then(Value::as_u64).unwrap_or(0) as u32;
            Utc.timestamp_opt(seconds, nanos).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

// ============================================================================
// Raw → domain
// ============================================================================

/// Map a raw store document to the domain entity.
///
/// Absent fields default; present-but-malformed fields are conversion errors
/// rather than silent data loss.
pub fn to_domain(id: &str, raw: &Value) -> Result<Entity, ConvertError> {
    Ok(Entity {
        id: id.to_string(),
        owner_id: read_string(id, raw, "ownerId")?,
        space_id: read_nullable_string(id, raw, "spaceId")?,
        kind: read_kind(id, raw)?,
        title: read_string(id, raw, "title")?,
        body: read_string(id, raw, "body")?,
        checklist: read_array(id, raw, "checklist")?,
        pinned: read_bool(id, raw, "pinned")?,
        archived: read_bool(id, raw, "archived")?,
        label_ids: read_array(id, raw, "labelIds")?,
        shared_with_user_ids: read_array(id, raw, "sharedWithUserIds")?,
        attachments: read_array(id, raw, "attachments")?,
        reactions: read_array(id, raw, "reactions")?,
        comments: read_array(id, raw, "comments")?,
        created_at: read_timestamp(id, raw, "createdAt")?.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        updated_at: read_timestamp(id, raw, "updatedAt")?.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        deleted_at: read_timestamp(id, raw, "deletedAt")?,
    })
}

fn read_string(id: &str, raw: &Value, field: &str) -> Result<String, ConvertError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(wrong_type(id, field, "string", other)),
    }
}

fn read_nullable_string(id: &str, raw: &Value, field: &str) -> Result<Option<String>, ConvertError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(wrong_type(id, field, "string or null", other)),
    }
}

fn read_bool(id: &str, raw: &Value, field: &str) -> Result<bool, ConvertError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(wrong_type(id, field, "boolean", other)),
    }
}

fn read_array<T: DeserializeOwned>(id: &str, raw: &Value, field: &str) -> Result<Vec<T>, ConvertError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v @ Value::Array(_)) => {
            serde_json::from_value(v.clone()).map_err(|_| wrong_type(id, field, "array", v))
        }
        Some(other) => Err(wrong_type(id, field, "array", other)),
    }
}

fn read_kind(id: &str, raw: &Value) -> Result<EntityKind, ConvertError> {
    match raw.get("kind") {
        None | Some(Value::Null) => Ok(EntityKind::default()),
        Some(v @ Value::String(_)) => {
            serde_json::from_value(v.clone()).map_err(|_| wrong_type(id, "kind", "entity kind", v))
        }
        Some(other) => Err(wrong_type(id, "kind", "entity kind", other)),
    }
}

fn read_timestamp(id: &str, raw: &Value, field: &str) -> Result<Option<DateTime<Utc>>, ConvertError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => timestamp_from_wire(v)
            .map(Some)
            .ok_or_else(|| ConvertError::BadTimestamp {
                id: id.to_string(),
                field: field.to_string(),
            }),
    }
}

fn wrong_type(id: &str, field: &str, expected: &'static str, found: &Value) -> ConvertError {
    ConvertError::WrongType {
        id: id.to_string(),
        field: field.to_string(),
        expected,
        found: type_name(found).to_string(),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Domain → raw
// ============================================================================

/// Full wire document for a freshly created entity. `createdAt`/`updatedAt`
/// are written as server-timestamp sentinels; `deletedAt` is explicit null so
/// the active-listing queries match the document.
pub fn entity_to_wire(entity: &Entity) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("ownerId".to_string(), Value::String(entity.owner_id.clone()));
    fields.insert(
        "spaceId".to_string(),
        match &entity.space_id {
            Some(s) => Value::String(s.clone()),
            None => Value::Null,
        },
    );
    fields.insert("kind".to_string(), to_json(&entity.kind));
    fields.insert("title".to_string(), Value::String(entity.title.clone()));
    fields.insert("body".to_string(), Value::String(entity.body.clone()));
    fields.insert("checklist".to_string(), to_json(&entity.checklist));
    fields.insert("pinned".to_string(), Value::Bool(entity.pinned));
    fields.insert("archived".to_string(), Value::Bool(entity.archived));
    fields.insert("labelIds".to_string(), to_json(&entity.label_ids));
    fields.insert(
        "sharedWithUserIds".to_string(),
        to_json(&entity.shared_with_user_ids),
    );
    fields.insert("attachments".to_string(), to_json(&entity.attachments));
    fields.insert("reactions".to_string(), to_json(&entity.reactions));
    fields.insert("comments".to_string(), to_json(&entity.comments));
    fields.insert("createdAt".to_string(), server_timestamp());
    fields.insert("updatedAt".to_string(), server_timestamp());
    fields.insert("deletedAt".to_string(), Value::Null);
    fields
}

/// Sparse wire fields for a partial update — exactly the `Set` fields of the
/// patch, nothing else. The caller layers `updatedAt` on top.
pub fn patch_to_wire(patch: &EntityPatch) -> Map<String, Value> {
    let mut fields = Map::new();

    if let Field::Set(v) = &patch.title {
        fields.insert("title".to_string(), Value::String(v.clone()));
    }
    if let Field::Set(v) = &patch.body {
        fields.insert("body".to_string(), Value::String(v.clone()));
    }
    if let Field::Set(v) = &patch.kind {
        fields.insert("kind".to_string(), to_json(v));
    }
    if let Field::Set(v) = &patch.checklist {
        fields.insert("checklist".to_string(), to_json(v));
    }
    if let Field::Set(v) = &patch.pinned {
        fields.insert("pinned".to_string(), Value::Bool(*v));
    }
    if let Field::Set(v) = &patch.archived {
        fields.insert("archived".to_string(), Value::Bool(*v));
    }
    if let Field::Set(v) = &patch.label_ids {
        fields.insert("labelIds".to_string(), to_json(v));
    }
    if let Field::Set(v) = &patch.space_id {
        fields.insert(
            "spaceId".to_string(),
            match v {
                Some(s) => Value::String(s.clone()),
                None => Value::Null,
            },
        );
    }
    if let Field::Set(v) = &patch.shared_with_user_ids {
        fields.insert("sharedWithUserIds".to_string(), to_json(v));
    }
    if let Field::Set(v) = &patch.attachments {
        fields.insert("attachments".to_string(), to_json(v));
    }
    if let Field::Set(v) = &patch.reactions {
        fields.insert("reactions".to_string(), to_json(v));
    }
    if let Field::Set(v) = &patch.comments {
        fields.insert("comments".to_string(), to_json(v));
    }

    fields
}

fn to_json<T: Serialize>(v: &T) -> Value {
    // Side types serialize infallibly (no maps with non-string keys).
    serde_json::to_value(v).unwrap_or(Value::Null)
}
