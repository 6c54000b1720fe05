use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel space id meaning "not shared" — entities in the personal space
/// are visible to their owner only.
pub const PERSONAL_SPACE: &str = "personal";

/// True when `space_id` denotes the personal (non-shared) scope.
pub fn is_personal_space(space_id: Option<&str>) -> bool {
    match space_id {
        None => true,
        Some(s) => s.is_empty() || s == PERSONAL_SPACE,
    }
}

// ============================================================================
// Entity and side types
// ============================================================================

/// Payload shape of an entity. `Checklist` is inferred at create time when the
/// input carries checklist items and no explicit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Text,
    Checklist,
}

impl Default for EntityKind {
    fn default() -> Self {
        Self::Text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub done: bool,
}

/// A logical attachment tied to a location in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub id: String,
    pub storage_path: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub content_type: String,
    pub size: u64,
}

/// A per-user reaction. At most one `(user_id, kind)` tuple exists per entity;
/// toggling an existing tuple removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The generic domain entity shared by Notes/Docs/Habits/Tasks/Moments.
///
/// `id` and `owner_id` are immutable after creation. `shared_with_user_ids`
/// is denormalized: whenever `space_id` is a shared space it must equal that
/// space's membership minus the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub owner_id: String,
    /// `None` (or the personal sentinel) means the entity is personal.
    pub space_id: Option<String>,
    pub kind: EntityKind,
    pub title: String,
    pub body: String,
    pub checklist: Vec<ChecklistItem>,
    pub pinned: bool,
    pub archived: bool,
    pub label_ids: Vec<String>,
    pub shared_with_user_ids: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `Some` marks soft deletion; the document itself is retained.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Whether the entity is visible in normal (non-trash) listing views.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether the entity belongs to a shared space.
    pub fn is_shared(&self) -> bool {
        !is_personal_space(self.space_id.as_deref())
    }
}

// ============================================================================
// Create input
// ============================================================================

/// Input for `EntityService::create`. Everything not supplied defaults to the
/// empty value; `kind` defaults by payload shape when `None`.
#[derive(Debug, Clone, Default)]
pub struct CreateEntity {
    pub title: String,
    pub body: String,
    pub kind: Option<EntityKind>,
    pub checklist: Vec<ChecklistItem>,
    pub space_id: Option<String>,
    pub pinned: bool,
    pub label_ids: Vec<String>,
    pub attachments: Vec<Attachment>,
}

// ============================================================================
// Per-item outcome types
// ============================================================================

/// Error associated with a specific entity in a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub id: String,
    pub error: String,
}

/// Outcome of a single permanent delete. The document is removed even when
/// attachment cleanup partially fails; the failed paths are reported here.
#[derive(Debug, Clone, Default)]
pub struct PurgeOutcome {
    pub attachment_errors: Vec<ItemError>,
}

impl PurgeOutcome {
    pub fn is_clean(&self) -> bool {
        self.attachment_errors.is_empty()
    }
}

/// Result of an "empty trash" bulk purge. Partial failure is reported per
/// item — it is never all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    pub purged_ids: Vec<String>,
    pub errors: Vec<ItemError>,
}

impl PurgeReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_space_sentinel() {
        assert!(is_personal_space(None));
        assert!(is_personal_space(Some("")));
        assert!(is_personal_space(Some(PERSONAL_SPACE)));
        assert!(!is_personal_space(Some("team-1")));
    }

    #[test]
    fn entity_kind_defaults_to_text() {
        assert_eq!(EntityKind::default(), EntityKind::Text);
    }

    #[test]
    fn attachment_wire_names_are_camel_case() {
        let a = Attachment {
            id: "a1".to_string(),
            storage_path: "attachments/u1/a1.png".to_string(),
            download_url: "https://files.example/a1".to_string(),
            content_type: "image/png".to_string(),
            size: 42,
        };
        let v = serde_json::to_value(&a).unwrap();
        assert!(v.get("storagePath").is_some());
        assert!(v.get("downloadURL").is_some());
        assert!(v.get("contentType").is_some());
    }

    #[test]
    fn purge_report_completeness() {
        let mut r = PurgeReport::default();
        r.purged_ids.push("a".to_string());
        assert!(r.is_complete());
        r.errors.push(ItemError {
            id: "b".to_string(),
            error: "blob delete failed".to_string(),
        });
        assert!(!r.is_complete());
    }
}
