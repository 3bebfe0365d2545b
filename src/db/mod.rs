//! Metadata persistence.
//!
//! `DatabaseBackend` is the only seam between `Storage` and a physical
//! record medium. Backends know nothing about sound files or tag rules;
//! they store what they are given and answer queries over it.

pub mod document;
pub mod sqlite;

use crate::error::{ArchiveError, Result};
use crate::models::{AudioMetadata, ListFilter, NewRecord, RecordPatch, SoundId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use document::DocumentBackend;
pub use sqlite::SqliteBackend;

/// Record store contract shared by every backend.
///
/// Swapping one implementation for another must not change anything
/// observable above this trait. Writes take `&mut self`: one process owns
/// the medium and there is exactly one writer.
pub trait DatabaseBackend {
    /// Persist a new record.
    ///
    /// Fails with `DuplicateIdentifier` if `record.id` is already taken and
    /// `NameExists` if the name is. Assigns a fresh id when none is supplied.
    fn insert(&mut self, record: NewRecord) -> Result<SoundId>;

    /// Fails with `NotFound` when no record has `id`.
    fn get(&self, id: SoundId) -> Result<AudioMetadata>;

    /// Records matching `filter`, oldest `created_at` first.
    fn list(&self, filter: &ListFilter) -> Result<Vec<AudioMetadata>>;

    /// Apply the `Some` fields of `patch` in one atomic write.
    fn update(&mut self, id: SoundId, patch: RecordPatch) -> Result<AudioMetadata>;

    /// Fails with `NotFound` when no record has `id`.
    fn delete(&mut self, id: SoundId) -> Result<()>;

    fn kind(&self) -> BackendKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    #[serde(alias = "document")]
    Json,
}

impl BackendKind {
    /// File name of the record medium inside the archive directory.
    pub fn file_name(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "archive.db",
            BackendKind::Json => "archive.json",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sqlite => f.write_str("sqlite"),
            BackendKind::Json => f.write_str("json"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "json" | "document" => Ok(BackendKind::Json),
            other => Err(format!("unknown backend '{}' (expected sqlite or json)", other)),
        }
    }
}

/// Open the backend of `kind` stored under `archive_dir`.
pub fn open_backend(kind: BackendKind, archive_dir: &Path) -> Result<Box<dyn DatabaseBackend>> {
    std::fs::create_dir_all(archive_dir).map_err(|e| {
        ArchiveError::BackendUnavailable(format!(
            "cannot create archive directory {}: {}",
            archive_dir.display(),
            e
        ))
    })?;
    let path = archive_dir.join(kind.file_name());

    let backend: Box<dyn DatabaseBackend> = match kind {
        BackendKind::Sqlite => Box::new(SqliteBackend::open(path)?),
        BackendKind::Json => Box::new(DocumentBackend::open(path)?),
    };
    tracing::debug!(backend = %kind, dir = %archive_dir.display(), "opened metadata backend");
    Ok(backend)
}
