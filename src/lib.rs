pub mod cli;
pub mod commander;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod player;
pub mod storage;
pub mod tags;

pub use commander::Commander;
pub use db::{open_backend, BackendKind, DatabaseBackend, DocumentBackend, SqliteBackend};
pub use error::{ArchiveError, DeleteSide, Result};
pub use models::{AudioFilter, AudioMetadata, Effects, ListFilter, PlaybackResult, SoundId};
pub use player::{AudioPlayer, AudioRenderer, CommandPlayer, CommandRenderer};
pub use storage::Storage;
