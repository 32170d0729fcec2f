//! Error types for the versioning engine
//!
//! Failures are local to a single file operation: history is replaced
//! wholesale on write, never patched in place, so there is no
//! partial-history corruption path.

use crate::store::StoreError;

/// Result type for engine operations
pub type Result<T, E = VersionError> = std::result::Result<T, E>;

/// Errors surfaced by the versioning engine
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("malformed version suffix `{suffix}` in segment `{segment}`")]
    MalformedVersion { segment: String, suffix: String },

    #[error("version {address} not found for {path}")]
    VersionNotFound { path: String, address: String },

    #[error("cannot write different content to pinned version {address} of {path}")]
    ImmutableVersionConflict { path: String, address: String },

    #[error("writes addressed to a pinned version of {path} may only update publication metadata")]
    InvalidPinnedWrite { path: String },

    #[error("symbolic version `{0}` must not parse as a number")]
    SymbolicVersionRequired(String),

    #[error("history for {path} is corrupt: {reason}")]
    CorruptHistory { path: String, reason: String },

    #[error("content is not valid UTF-8 text")]
    InvalidText,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
