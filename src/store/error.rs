// ABOUTME: Checkpoint store error types with SNAFU pattern.
// ABOUTME: Carries the path or key involved for programmatic handling.

use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    #[snafu(display("failed to create state directory {}: {source}", path.display()))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to remove {}: {source}", path.display()))]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("corrupt entry for key {key}: {source}"))]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[snafu(display("failed to encode entry for key {key}: {source}"))]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Filesystem operation failed.
    Io,
    /// Stored bytes could not be decoded.
    Corrupt,
    /// Value could not be encoded.
    Encode,
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::CreateDir { .. }
            | StoreError::Read { .. }
            | StoreError::Write { .. }
            | StoreError::Remove { .. } => StoreErrorKind::Io,
            StoreError::Corrupt { .. } => StoreErrorKind::Corrupt,
            StoreError::Encode { .. } => StoreErrorKind::Encode,
        }
    }
}
