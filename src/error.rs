//! Error types for the sound archive

use crate::models::SoundId;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the archive
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Which half of a two-phase delete an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSide {
    Record,
    File,
}

impl fmt::Display for DeleteSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteSide::Record => f.write_str("record"),
            DeleteSide::File => f.write_str("file"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// No record for the given id or name
    #[error("Not found: {0}")]
    NotFound(String),

    /// Source file missing when adding a sound
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Record exists but the file it points at is gone
    #[error("Sound {id} has no file at {}", path.display())]
    MissingFile { id: SoundId, path: PathBuf },

    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(SoundId),

    #[error("Name already exists: {0}")]
    NameExists(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Stored path escapes the sound directory or is not a plain file name
    #[error("Invalid stored path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Remove completed on one side only; needs manual reconciliation
    #[error("Partial delete of {id}: {completed} removed, {pending} left behind ({reason})")]
    PartialDelete {
        id: SoundId,
        completed: DeleteSide,
        pending: DeleteSide,
        reason: String,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Corrupt archive document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Invalid effects: {0}")]
    InvalidEffects(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Data-integrity states that need user action rather than a retry.
    pub fn is_integrity_warning(&self) -> bool {
        matches!(
            self,
            ArchiveError::MissingFile { .. } | ArchiveError::PartialDelete { .. }
        )
    }
}

impl From<rusqlite::Error> for ArchiveError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase
                | ErrorCode::ReadOnly
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::PermissionDenied,
            ) => ArchiveError::BackendUnavailable(err.to_string()),
            _ => ArchiveError::Database(err),
        }
    }
}
