//! User-facing operations.
//!
//! `Commander` sits between an interface and `Storage`. Apart from playback
//! and rendering it adds no semantics of its own: each operation forwards to
//! Storage and returns its result or error unchanged.

use crate::error::{ArchiveError, Result};
use crate::models::{AudioMetadata, Effects, ListFilter, PlaybackResult, SoundId};
use crate::player::{AudioPlayer, AudioRenderer, CommandRenderer};
use crate::storage::Storage;
use crate::tags::validate_name;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Commander {
    storage: Storage,
    player: Box<dyn AudioPlayer>,
    renderer: Box<dyn AudioRenderer>,
}

impl Commander {
    /// Renders through ffmpeg unless `with_renderer` says otherwise.
    pub fn new(storage: Storage, player: Box<dyn AudioPlayer>) -> Self {
        Self {
            storage,
            player,
            renderer: Box::new(CommandRenderer::default()),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn AudioRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Play one sound. `last_played` is only stamped after the player
    /// reports success.
    pub fn play(&mut self, id: SoundId, effects: &Effects) -> Result<PlaybackResult> {
        effects.validate()?;

        // 1. Record and file must both be present
        let sound = self.storage.get_sound(id)?;
        let path = self.storage.resolve_path(&sound)?;

        // 2. Play
        if let Err(e) = self.player.play(&path, effects) {
            warn!(sound = %id, error = %e, "playback failed");
            return Err(e);
        }

        // 3. Confirmed playback
        let sound = self.storage.mark_played(id)?;
        info!(sound = %id, name = %sound.name, "played sound");
        Ok(PlaybackResult { sound, path })
    }

    /// Play sounds back to back, stopping at the first failure.
    pub fn play_sequence(&mut self, ids: &[SoundId], effects: &Effects) -> Result<Vec<PlaybackResult>> {
        effects.validate()?;
        ids.iter().map(|id| self.play(*id, effects)).collect()
    }

    /// Play sounds simultaneously and wait for all of them.
    ///
    /// Every sound is resolved before anything starts, so a missing record
    /// or file fails the whole call. After that each sound gets its own
    /// result, in input order, and only the ones that played are stamped.
    pub fn play_parallel(
        &mut self,
        ids: &[SoundId],
        effects: &Effects,
    ) -> Result<Vec<Result<PlaybackResult>>> {
        effects.validate()?;

        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            let sound = self.storage.get_sound(*id)?;
            resolved.push((sound.id, self.storage.resolve_path(&sound)?));
        }
        let paths: Vec<PathBuf> = resolved.iter().map(|(_, path)| path.clone()).collect();
        let outcomes = self.player.play_all(&paths, effects);

        let mut results = Vec::with_capacity(resolved.len());
        for ((id, path), outcome) in resolved.into_iter().zip(outcomes) {
            results.push(match outcome {
                Ok(()) => self
                    .storage
                    .mark_played(id)
                    .map(|sound| PlaybackResult { sound, path }),
                Err(e) => {
                    warn!(sound = %id, error = %e, "parallel playback failed");
                    Err(e)
                }
            });
        }
        Ok(results)
    }

    /// Archive a copy of `id` with `effects` applied as a new sound.
    ///
    /// The copy inherits the source's author and tags, plus `tags`.
    pub fn save<I, S>(&mut self, id: SoundId, effects: &Effects, name: &str, tags: I) -> Result<AudioMetadata>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        effects.validate()?;
        let name = validate_name(name)?;
        let source = self.storage.get_sound(id)?;
        let path = self.storage.resolve_path(&source)?;
        if self.storage.find_by_name(&name).is_ok() {
            return Err(ArchiveError::NameExists(name));
        }

        let tags: Vec<String> = source
            .tags
            .iter()
            .cloned()
            .chain(tags.into_iter().map(|t| t.as_ref().to_string()))
            .collect();

        let saved = if effects.is_identity() {
            self.storage
                .add_named_sound(&path, tags, Some(&name), source.author.as_deref())?
        } else {
            // Same extension as the source so the renderer keeps the format
            let suffix = path
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            let staging = tempfile::Builder::new()
                .prefix("sound-archive-")
                .suffix(&suffix)
                .tempfile()?;
            self.renderer.render(&path, effects, staging.path())?;
            self.storage
                .add_named_sound(staging.path(), tags, Some(&name), source.author.as_deref())?
        };

        info!(source = %id, sound = %saved.id, name = %saved.name, "saved edited sound");
        Ok(saved)
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<AudioMetadata>> {
        self.storage.list_sounds(filter)
    }

    pub fn get(&self, id: SoundId) -> Result<AudioMetadata> {
        self.storage.get_sound(id)
    }

    pub fn add<I, S>(
        &mut self,
        path: &Path,
        tags: I,
        name: Option<&str>,
        author: Option<&str>,
    ) -> Result<AudioMetadata>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.storage.add_named_sound(path, tags, name, author)
    }

    pub fn tag<A, R, S1, S2>(&mut self, id: SoundId, add: A, remove: R) -> Result<AudioMetadata>
    where
        A: IntoIterator<Item = S1>,
        R: IntoIterator<Item = S2>,
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        self.storage.tag_sound(id, add, remove)
    }

    pub fn remove(&mut self, id: SoundId) -> Result<()> {
        self.storage.remove_sound(id)
    }

    pub fn rename(&mut self, id: SoundId, new_name: &str) -> Result<AudioMetadata> {
        self.storage.rename(id, new_name)
    }

    pub fn fuzzy_search(&self, target: &str, n: usize) -> Result<Vec<AudioMetadata>> {
        self.storage.fuzzy_search(target, n)
    }

    pub fn clean(&mut self) -> Result<Vec<AudioMetadata>> {
        self.storage.clean()
    }

    pub fn orphans(&self) -> Result<Vec<PathBuf>> {
        self.storage.orphaned_files()
    }

    pub fn remove_orphans(&mut self) -> Result<Vec<PathBuf>> {
        self.storage.remove_orphans()
    }

    /// Resolve a UUID or a sound name to an id.
    pub fn lookup(&self, reference: &str) -> Result<SoundId> {
        self.storage.lookup(reference)
    }
}
