//! Configuration loading and archive directory resolution.
//!
//! Config file lookup, highest priority first:
//! 1. Explicit path (`--config`); must exist
//! 2. `SOUND_ARCHIVE_CONFIG` environment variable; must exist
//! 3. `<config dir>/sound-archive/config.toml`, if present
//! 4. Compiled defaults
//!
//! The archive directory and backend can then be overridden from the
//! command line or environment (see `Overrides`).

use crate::db::BackendKind;
use crate::error::{ArchiveError, Result};
use crate::player::{DEFAULT_PLAYER, DEFAULT_RENDERER};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "SOUND_ARCHIVE_CONFIG";
const APP_DIR_NAME: &str = "sound-archive";
const SOUNDS_DIR_NAME: &str = "sounds";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Root of the archive: holds `sounds/` and the backend's file
    pub archive_dir: PathBuf,
    pub backend: BackendKind,
    /// Playback program, invoked with ffplay-style arguments
    pub player: String,
    pub player_args: Vec<String>,
    /// Program used to write edited copies, invoked with ffmpeg-style arguments
    pub renderer: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            backend: BackendKind::default(),
            player: DEFAULT_PLAYER.to_string(),
            player_args: Vec::new(),
            renderer: DEFAULT_RENDERER.to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub archive_dir: Option<PathBuf>,
    pub backend: Option<BackendKind>,
}

impl ArchiveConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ArchiveError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ArchiveError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| ArchiveError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load following the priority order in the module docs.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = user_config_path().filter(|p| p.exists()) {
            return Self::from_file(&path);
        }
        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(dir) = overrides.archive_dir {
            self.archive_dir = dir;
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        self
    }

    pub fn sound_dir(&self) -> PathBuf {
        self.archive_dir.join(SOUNDS_DIR_NAME)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// OS-dependent default archive root
pub fn default_archive_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR_NAME))
}
