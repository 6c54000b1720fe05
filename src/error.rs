use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failure surfaced by the remote document store or blob store.
///
/// This layer does not distinguish transient outages from permission failures
/// beyond carrying the variant — both are surfaced to the caller as a rejected
/// operation and interpreted at the presentation layer.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Permission denied on {collection}/{id}")]
    PermissionDenied { collection: String, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Blob store error at \"{path}\": {message}")]
    Blob { path: String, message: String },

    #[error("Batch write failed: {0}")]
    Batch(String),
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn blob(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Blob {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConvertError
// ---------------------------------------------------------------------------

/// Failure mapping a raw store document to the domain entity.
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    #[error("Document {id}: field \"{field}\" expected {expected}, found {found}")]
    WrongType {
        id: String,
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Document {id}: unreadable timestamp in \"{field}\"")]
    BadTimestamp { id: String, field: String },
}

// ---------------------------------------------------------------------------
// SpaceSyncError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SpaceSyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias — the default error type is `SpaceSyncError`.
pub type Result<T, E = SpaceSyncError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
