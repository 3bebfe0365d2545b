#![allow(dead_code)]

use sound_archive::{open_backend, BackendKind, Storage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const BACKENDS: [BackendKind; 2] = [BackendKind::Sqlite, BackendKind::Json];

/// Temp archive plus a separate directory to add sounds from.
pub struct Fixture {
    pub dir: TempDir,
    pub storage: Storage,
}

impl Fixture {
    pub fn new(kind: BackendKind) -> Self {
        let dir = TempDir::new().unwrap();
        let archive_dir = dir.path().join("archive");
        let backend = open_backend(kind, &archive_dir).unwrap();
        let storage = Storage::open(archive_dir.join("sounds"), backend).unwrap();
        fs::create_dir_all(dir.path().join("incoming")).unwrap();
        Self { dir, storage }
    }

    /// Write a source file outside the archive and return its path.
    pub fn source(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("incoming").join(name);
        fs::write(&path, format!("RIFF fake audio for {}", name)).unwrap();
        path
    }

    pub fn sound_dir(&self) -> &Path {
        self.storage.sound_dir()
    }
}
