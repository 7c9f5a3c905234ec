//! Error types for the turn-processing pipeline.
//!
//! Follows the one-small-enum-per-concern shape used across this crate
//! (`DiceError`, `PersistError`, ...): a single `CoreError` covers the
//! pipeline boundary, while individual capabilities define their own
//! error types and convert into it at the call site.

use thiserror::Error;

/// Errors surfaced by [`crate::pipeline::Core::process_message`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// The intent classifier could not produce any recognized intent.
    #[error("could not classify message intent: {0}")]
    Classification(String),

    /// A capability (Generator, Embedder, ...) did not respond within its
    /// soft deadline.
    #[error("capability '{capability}' timed out after {elapsed_ms}ms")]
    CapabilityTimeout { capability: String, elapsed_ms: u64 },

    /// A capability returned an error that the pipeline cannot recover
    /// from within the current turn.
    #[error("capability '{capability}' unavailable: {source}")]
    CapabilityUnavailable {
        capability: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Optimistic-concurrency checkpoint write lost a race with another
    /// writer for the same session.
    #[error("session {session_id} checkpoint conflict: expected version {expected}, found {found}")]
    StoreConflict {
        session_id: String,
        expected: u64,
        found: u64,
    },

    /// A `[MECHANICS]` block (or its regex fallback) could not be parsed
    /// into a known mechanic type.
    #[error("failed to extract mechanics from DM output: {0}")]
    Extraction(String),

    /// A pipeline invariant was violated (e.g. a node ran out of order).
    /// Indicates a bug in the engine, not a user-facing failure.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// The named session does not exist in the configured `SessionStore`.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// JSON (de)serialization failure at a capability boundary.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    pub fn capability_unavailable(
        capability: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CoreError::CapabilityUnavailable {
            capability: capability.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_message_includes_versions() {
        let err = CoreError::StoreConflict {
            session_id: "s1".into(),
            expected: 3,
            found: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected version 3"));
        assert!(msg.contains("found 4"));
    }

    #[test]
    fn capability_timeout_displays_capability_name() {
        let err = CoreError::CapabilityTimeout {
            capability: "Generator".into(),
            elapsed_ms: 30_000,
        };
        assert!(err.to_string().contains("Generator"));
    }
}
