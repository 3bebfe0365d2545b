//! Business-level view of the archive.
//!
//! `Storage` owns the sound directory and is the only writer of metadata
//! records. It validates and normalizes input, resolves file paths, and
//! checks files on disk, leaving the backend a plain record store. There is
//! no cache: every read goes to the backend, so what callers see is exactly
//! what was last written.

use crate::db::DatabaseBackend;
use crate::error::{ArchiveError, DeleteSide, Result};
use crate::models::{AudioMetadata, ListFilter, NewRecord, RecordPatch, SoundId};
use crate::tags::{normalize_required_tags, normalize_tags, validate_author, validate_name};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, warn};

pub struct Storage {
    sound_dir: PathBuf,
    backend: Box<dyn DatabaseBackend>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("sound_dir", &self.sound_dir)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl Storage {
    pub fn open(sound_dir: impl Into<PathBuf>, backend: Box<dyn DatabaseBackend>) -> Result<Self> {
        let sound_dir = sound_dir.into();
        fs::create_dir_all(&sound_dir)?;
        Ok(Self { sound_dir, backend })
    }

    pub fn sound_dir(&self) -> &Path {
        &self.sound_dir
    }

    /// Add a sound named after the source file's stem.
    pub fn add_sound<I, S>(&mut self, source: &Path, tags: I) -> Result<AudioMetadata>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_named_sound(source, tags, None, None)
    }

    /// Copy `source` into the sound directory and insert its record.
    pub fn add_named_sound<I, S>(
        &mut self,
        source: &Path,
        tags: I,
        name: Option<&str>,
        author: Option<&str>,
    ) -> Result<AudioMetadata>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // 1. Source must be an existing, readable file
        let mut reader = open_source(source)?;

        // 2. Normalize everything before touching the sound directory
        let tags = normalize_tags(tags)?;
        let name = match name {
            Some(name) => validate_name(name)?,
            None => validate_name(&default_name(source)?)?,
        };
        let author = validate_author(author)?;
        if !self.backend.list(&ListFilter::with_name(name.as_str()))?.is_empty() {
            return Err(ArchiveError::NameExists(name));
        }

        // 3. Copy under a generated, collision-free name
        let id = SoundId::new();
        let file_path = PathBuf::from(stored_file_name(id, source));
        let dest = self.sound_dir.join(&file_path);
        copy_new(&mut reader, &dest)?;

        // 4. Record; a failed insert must not leave the copy behind
        let record = NewRecord {
            id: Some(id),
            name,
            author,
            file_path,
            tags,
            created_at: Utc::now(),
        };
        let id = match self.backend.insert(record.clone()) {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&dest) {
                    warn!(path = %dest.display(), error = %cleanup, "failed to remove copied file after insert error");
                }
                return Err(e);
            }
        };

        info!(sound = %id, name = %record.name, source = %source.display(), "added sound");
        Ok(record.into_metadata(id))
    }

    /// Fetch a record and confirm its file is still on disk.
    pub fn get_sound(&self, id: SoundId) -> Result<AudioMetadata> {
        let record = self.backend.get(id)?;
        let path = self.resolve_path(&record)?;
        if !path.is_file() {
            warn!(sound = %id, path = %path.display(), "record points at a missing file");
            return Err(ArchiveError::MissingFile { id, path });
        }
        Ok(record)
    }

    pub fn list_sounds(&self, filter: &ListFilter) -> Result<Vec<AudioMetadata>> {
        let normalized = ListFilter {
            tags: filter.tags.as_ref().map(|t| normalize_tags(t.iter())).transpose()?,
            text: filter
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            name: filter.name.as_deref().map(|n| n.trim().to_string()),
        };
        self.backend.list(&normalized)
    }

    /// Replace the tag set with `(current ∪ add) − remove`.
    pub fn tag_sound<A, R, S1, S2>(&mut self, id: SoundId, add: A, remove: R) -> Result<AudioMetadata>
    where
        A: IntoIterator<Item = S1>,
        R: IntoIterator<Item = S2>,
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        let add = normalize_required_tags(add)?;
        let remove = normalize_tags(remove)?;

        let current = self.backend.get(id)?;
        let tags: BTreeSet<String> = current
            .tags
            .union(&add)
            .filter(|t| !remove.contains(*t))
            .cloned()
            .collect();

        let updated = self.backend.update(
            id,
            RecordPatch {
                tags: Some(tags),
                ..RecordPatch::default()
            },
        )?;
        debug!(sound = %id, tags = ?updated.tags, "updated tags");
        Ok(updated)
    }

    /// Stamp `last_played` with the current time.
    pub fn mark_played(&mut self, id: SoundId) -> Result<AudioMetadata> {
        self.backend.update(
            id,
            RecordPatch {
                last_played: Some(Utc::now()),
                ..RecordPatch::default()
            },
        )
    }

    /// Delete the record, then the file.
    ///
    /// If the record goes but the file cannot be removed the result is
    /// `PartialDelete`; the file then shows up in `orphaned_files`. A record
    /// whose stored path is invalid is still deleted, reported the same way.
    pub fn remove_sound(&mut self, id: SoundId) -> Result<()> {
        let record = self.backend.get(id)?;
        let path = self.resolve_path(&record);

        // 1. Record. Nothing has changed yet if this fails.
        self.backend.delete(id)?;

        let path = match path {
            Ok(path) => path,
            Err(e) => {
                error!(sound = %id, path = %record.file_path.display(), "record removed but its stored path is invalid");
                return Err(ArchiveError::PartialDelete {
                    id,
                    completed: DeleteSide::Record,
                    pending: DeleteSide::File,
                    reason: e.to_string(),
                });
            }
        };

        // 2. File
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(sound = %id, path = %path.display(), "file was already gone");
            }
            Err(e) => {
                error!(sound = %id, path = %path.display(), error = %e, "record removed but file deletion failed");
                return Err(ArchiveError::PartialDelete {
                    id,
                    completed: DeleteSide::Record,
                    pending: DeleteSide::File,
                    reason: e.to_string(),
                });
            }
        }

        info!(sound = %id, name = %record.name, "removed sound");
        Ok(())
    }

    /// Absolute location of a record's file. Stored paths must be a bare file name.
    pub fn resolve_path(&self, record: &AudioMetadata) -> Result<PathBuf> {
        let mut components = record.file_path.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.sound_dir.join(&record.file_path)),
            _ => Err(ArchiveError::InvalidPath(record.file_path.clone())),
        }
    }

    pub fn find_by_name(&self, name: &str) -> Result<AudioMetadata> {
        self.backend
            .list(&ListFilter::with_name(name.trim()))?
            .into_iter()
            .next()
            .ok_or_else(|| ArchiveError::NotFound(format!("no sound named '{}'", name.trim())))
    }

    /// Resolve a user reference, either a UUID or a sound name.
    ///
    /// A UUID-shaped reference that matches no record is retried as a name.
    pub fn lookup(&self, reference: &str) -> Result<SoundId> {
        if let Ok(id) = reference.trim().parse::<SoundId>() {
            match self.backend.get(id) {
                Ok(_) => return Ok(id),
                Err(ArchiveError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            return match self.find_by_name(reference) {
                Err(ArchiveError::NotFound(_)) => Err(ArchiveError::NotFound(id.to_string())),
                other => other.map(|r| r.id),
            };
        }
        self.find_by_name(reference).map(|r| r.id)
    }

    pub fn rename(&mut self, id: SoundId, new_name: &str) -> Result<AudioMetadata> {
        let name = validate_name(new_name)?;
        let updated = self.backend.update(
            id,
            RecordPatch {
                name: Some(name),
                ..RecordPatch::default()
            },
        )?;
        info!(sound = %id, name = %updated.name, "renamed sound");
        Ok(updated)
    }

    /// Up to `n` sounds, closest name (by edit distance) first.
    pub fn fuzzy_search(&self, target: &str, n: usize) -> Result<Vec<AudioMetadata>> {
        let target = target.trim().to_lowercase();
        let mut records = self.backend.list(&ListFilter::default())?;
        // Stable: ties keep creation order
        records.sort_by_key(|r| strsim::levenshtein(&target, &r.name.to_lowercase()));
        records.truncate(n);
        Ok(records)
    }

    /// Drop every record whose file no longer exists. Returns what was removed.
    pub fn clean(&mut self) -> Result<Vec<AudioMetadata>> {
        let mut removed = Vec::new();
        for record in self.backend.list(&ListFilter::default())? {
            let present = self
                .resolve_path(&record)
                .map(|p| p.is_file())
                .unwrap_or(false);
            if !present {
                self.backend.delete(record.id)?;
                info!(sound = %record.id, name = %record.name, "cleaned record without file");
                removed.push(record);
            }
        }
        Ok(removed)
    }

    /// Files in the sound directory that no record references.
    pub fn orphaned_files(&self) -> Result<Vec<PathBuf>> {
        let referenced: HashSet<PathBuf> = self
            .backend
            .list(&ListFilter::default())?
            .into_iter()
            .map(|r| r.file_path)
            .collect();

        let mut orphans = Vec::new();
        for entry in fs::read_dir(&self.sound_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if !referenced.contains(Path::new(&entry.file_name())) {
                orphans.push(entry.path());
            }
        }
        orphans.sort();
        Ok(orphans)
    }

    pub fn remove_orphans(&mut self) -> Result<Vec<PathBuf>> {
        let orphans = self.orphaned_files()?;
        for path in &orphans {
            fs::remove_file(path)?;
            info!(path = %path.display(), "removed orphaned file");
        }
        Ok(orphans)
    }
}

fn open_source(source: &Path) -> Result<File> {
    match fs::metadata(source) {
        Ok(meta) if meta.is_file() => Ok(File::open(source)?),
        Ok(_) => Err(ArchiveError::FileNotFound(source.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ArchiveError::FileNotFound(source.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn default_name(source: &Path) -> Result<String> {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ArchiveError::InvalidName(format!("cannot derive a name from {}", source.display()))
        })
}

fn stored_file_name(id: SoundId, source: &Path) -> String {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", id, ext.to_lowercase()),
        _ => id.to_string(),
    }
}

/// Copy into a file that must not exist yet; a partial copy is removed.
fn copy_new<R: Read>(reader: &mut R, dest: &Path) -> Result<()> {
    let mut out = OpenOptions::new().write(true).create_new(true).open(dest)?;
    if let Err(e) = io::copy(reader, &mut out) {
        drop(out);
        if let Err(cleanup) = fs::remove_file(dest) {
            warn!(path = %dest.display(), error = %cleanup, "failed to remove partial copy");
        }
        return Err(e.into());
    }
    Ok(())
}
