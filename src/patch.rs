//! Sparse update type for entities.
//!
//! Every mutable field is `Field::Unset` until explicitly supplied, so the
//! wire layer can serialize exactly the touched fields and nothing else.
//! Untouched fields are never overwritten — concurrent writers editing
//! different fields both win.

use crate::types::{Attachment, ChecklistItem, Comment, EntityKind, Reaction};

// ============================================================================
// Field<T>
// ============================================================================

/// Explicit presence wrapper: `Unset` fields are omitted from writes entirely,
/// `Set` fields are written (including `Set(None)` for nullable fields, which
/// serializes as JSON null).
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Unset,
    Set(T),
}

impl<T> Field<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Field::Set(_))
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Field::Unset => None,
            Field::Set(v) => Some(v),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Unset => None,
            Field::Set(v) => Some(v),
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unset
    }
}

impl<T> From<T> for Field<T> {
    fn from(v: T) -> Self {
        Field::Set(v)
    }
}

// ============================================================================
// EntityPatch
// ============================================================================

/// A sparse update to a single entity. Construct with the fluent setters and
/// pass to `EntityService::update` / `batch_update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub title: Field<String>,
    pub body: Field<String>,
    pub kind: Field<EntityKind>,
    pub checklist: Field<Vec<ChecklistItem>>,
    pub pinned: Field<bool>,
    pub archived: Field<bool>,
    pub label_ids: Field<Vec<String>>,
    /// `Set(None)` moves the entity to the personal space.
    pub space_id: Field<Option<String>>,
    pub shared_with_user_ids: Field<Vec<String>>,
    pub attachments: Field<Vec<Attachment>>,
    pub reactions: Field<Vec<Reaction>>,
    pub comments: Field<Vec<Comment>>,
}

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Field::Set(title.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Field::Set(body.into());
        self
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Field::Set(kind);
        self
    }

    pub fn checklist(mut self, items: Vec<ChecklistItem>) -> Self {
        self.checklist = Field::Set(items);
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Field::Set(pinned);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = Field::Set(archived);
        self
    }

    pub fn label_ids(mut self, ids: Vec<String>) -> Self {
        self.label_ids = Field::Set(ids);
        self
    }

    pub fn space_id(mut self, space_id: Option<String>) -> Self {
        self.space_id = Field::Set(space_id);
        self
    }

    pub fn shared_with_user_ids(mut self, ids: Vec<String>) -> Self {
        self.shared_with_user_ids = Field::Set(ids);
        self
    }

    pub fn attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = Field::Set(attachments);
        self
    }

    pub fn reactions(mut self, reactions: Vec<Reaction>) -> Self {
        self.reactions = Field::Set(reactions);
        self
    }

    pub fn comments(mut self, comments: Vec<Comment>) -> Self {
        self.comments = Field::Set(comments);
        self
    }

    /// True when no field is set — such a patch is a no-op and services skip
    /// the write entirely.
    pub fn is_empty(&self) -> bool {
        !(self.title.is_set()
            || self.body.is_set()
            || self.kind.is_set()
            || self.checklist.is_set()
            || self.pinned.is_set()
            || self.archived.is_set()
            || self.label_ids.is_set()
            || self.space_id.is_set()
            || self.shared_with_user_ids.is_set()
            || self.attachments.is_set()
            || self.reactions.is_set()
            || self.comments.is_set())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_defaults_to_unset() {
        let f: Field<String> = Field::default();
        assert!(!f.is_set());
        assert!(f.into_option().is_none());
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(EntityPatch::new().is_empty());
    }

    #[test]
    fn setter_marks_field_set() {
        let p = EntityPatch::new().title("Hi");
        assert!(!p.is_empty());
        assert_eq!(p.title.as_ref().map(String::as_str), Some("Hi"));
        assert!(!p.body.is_set());
    }

    #[test]
    fn set_none_space_is_present() {
        let p = EntityPatch::new().space_id(None);
        assert!(p.space_id.is_set());
        assert_eq!(p.space_id.as_ref(), Some(&None));
    }
}
