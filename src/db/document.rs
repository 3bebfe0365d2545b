use crate::db::{BackendKind, DatabaseBackend};
use crate::error::{ArchiveError, Result};
use crate::models::{AudioMetadata, ListFilter, NewRecord, RecordPatch, SoundId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DOCUMENT_VERSION: u32 = 1;

/// On-disk layout of the archive document.
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveDocument {
    version: u32,
    /// Kept in insertion order
    sounds: Vec<AudioMetadata>,
}

impl Default for ArchiveDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            sounds: Vec::new(),
        }
    }
}

impl ArchiveDocument {
    fn position(&self, id: SoundId) -> Option<usize> {
        self.sounds.iter().position(|s| s.id == id)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.sounds.iter().any(|s| s.name == name)
    }
}

/// Backend storing every record in one JSON document.
///
/// Each call loads the document, works on it, and (for writes) replaces the
/// file atomically through a temp file and rename. Nothing is held in memory
/// between calls.
#[derive(Debug)]
pub struct DocumentBackend {
    path: PathBuf,
}

impl DocumentBackend {
    /// Create an empty document if none exists yet, then validate it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let backend = Self {
            path: path.as_ref().to_path_buf(),
        };
        if !backend.path.exists() {
            backend.save(&ArchiveDocument::default())?;
        }
        // Fail early on an unreadable or corrupt document
        backend.load()?;
        Ok(backend)
    }

    /// Only `open` creates the document; a missing file afterwards is an
    /// unavailable medium, not an empty archive.
    fn load(&self) -> Result<ArchiveDocument> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            ArchiveError::BackendUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let doc: ArchiveDocument = serde_json::from_str(&text)?;
        if doc.version != DOCUMENT_VERSION {
            return Err(ArchiveError::BackendUnavailable(format!(
                "{}: unsupported document version {}",
                self.path.display(),
                doc.version
            )));
        }
        Ok(doc)
    }

    fn save(&self, doc: &ArchiveDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");

        let unavailable =
            |e: std::io::Error| ArchiveError::BackendUnavailable(format!("{}: {}", self.path.display(), e));
        fs::write(&tmp, json).map_err(unavailable)?;
        fs::rename(&tmp, &self.path).map_err(unavailable)?;
        Ok(())
    }
}

impl DatabaseBackend for DocumentBackend {
    fn insert(&mut self, record: NewRecord) -> Result<SoundId> {
        let mut doc = self.load()?;
        let id = record.id.unwrap_or_default();

        if doc.position(id).is_some() {
            return Err(ArchiveError::DuplicateIdentifier(id));
        }
        if doc.name_taken(&record.name) {
            return Err(ArchiveError::NameExists(record.name));
        }

        doc.sounds.push(record.into_metadata(id));
        self.save(&doc)?;
        tracing::debug!(sound = %id, "document: inserted record");
        Ok(id)
    }

    fn get(&self, id: SoundId) -> Result<AudioMetadata> {
        let doc = self.load()?;
        doc.sounds
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ArchiveError::NotFound(id.to_string()))
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<AudioMetadata>> {
        let doc = self.load()?;
        let mut records: Vec<AudioMetadata> =
            doc.sounds.into_iter().filter(|s| filter.matches(s)).collect();
        // Stable sort: equal timestamps keep insertion order
        records.sort_by_key(|s| s.created_at);
        Ok(records)
    }

    fn update(&mut self, id: SoundId, patch: RecordPatch) -> Result<AudioMetadata> {
        let mut doc = self.load()?;
        let index = doc
            .position(id)
            .ok_or_else(|| ArchiveError::NotFound(id.to_string()))?;
        if patch.is_empty() {
            return Ok(doc.sounds.swap_remove(index));
        }

        if let Some(name) = &patch.name {
            if *name != doc.sounds[index].name && doc.name_taken(name) {
                return Err(ArchiveError::NameExists(name.clone()));
            }
        }

        patch.apply(&mut doc.sounds[index]);
        let updated = doc.sounds[index].clone();
        self.save(&doc)?;
        Ok(updated)
    }

    fn delete(&mut self, id: SoundId) -> Result<()> {
        let mut doc = self.load()?;
        let index = doc
            .position(id)
            .ok_or_else(|| ArchiveError::NotFound(id.to_string()))?;
        doc.sounds.remove(index);
        self.save(&doc)?;
        tracing::debug!(sound = %id, "document: deleted record");
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Json
    }
}
