//! Error taxonomy for the retrieval core: validation, conflict (dedup),
//! missing capability, transient storage, and catastrophic corruption. Every
//! sub-step of ingestion and sleep-compute catches locally and attaches its
//! error to the operation's structured result rather than aborting — see
//! `crate::ingestion::IngestOutcome::Created::warnings` and
//! `crate::sleep::SleepReport`.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the retrieval core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input failed validation (empty content, unknown importance, bad filter).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Note id does not exist in the store.
    #[error("note not found: {0}")]
    NotFound(i64),

    /// Dedup rejected the ingest at the duplicate threshold.
    #[error("duplicate of note {existing_id} at similarity {similarity:.4}")]
    Duplicate {
        /// The id of the pre-existing, near-identical note.
        existing_id: i64,
        /// Cosine similarity that triggered the rejection.
        similarity: f32,
    },

    /// An optional model (NER, reranker, relation extractor) is unavailable.
    /// The pipeline degrades to the remaining signals; this is logged once,
    /// not propagated to the caller.
    #[error("capability unavailable: {0}")]
    MissingCapability(String),

    /// A storage write failed mid sub-step. Ingestion/sleep report partial
    /// success; the caller is never automatically rolled back.
    #[error("storage error: {0}")]
    Storage(String),

    /// The persistent store itself is unreadable or corrupt. Not
    /// recoverable short of restoring from a sleep-compute snapshot.
    #[error("store corrupted: {0}")]
    Corruption(String),

    /// Dimension mismatch between a note's embedding and the active
    /// provider. Recoverable by re-index tooling, never surfaced mid-search
    /// (the scoring stages treat the note as having no embedding).
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension declared by the active embedding provider.
        expected: usize,
        /// Dimension actually stored on the note.
        actual: usize,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding provider error: {0}")]
    Embedding(#[from] anyhow::Error),
}

impl Error {
    /// Whether a caller may usefully retry this operation, possibly after
    /// backoff.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::MissingCapability(_) | Error::Io(_) | Error::Embedding(_)
        )
    }

    /// Whether this is the dedup conflict variant.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::Duplicate { .. })
    }

    /// Build a [`Error::NotFound`] from a note id for call-site brevity.
    #[must_use]
    pub fn not_found(id: i64) -> Self {
        Error::NotFound(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_recoverable() {
        assert!(Error::Storage("write failed".into()).is_recoverable());
    }

    #[test]
    fn duplicate_is_not_recoverable_but_is_flagged() {
        let e = Error::Duplicate {
            existing_id: 1,
            similarity: 0.97,
        };
        assert!(!e.is_recoverable());
        assert!(e.is_duplicate());
    }

    #[test]
    fn validation_is_not_recoverable() {
        assert!(!Error::Validation("empty content".into()).is_recoverable());
    }
}
