use crate::error::{ArchiveError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of an archived sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoundId(Uuid);

impl SoundId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SoundId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AudioMetadata {
    pub id: SoundId,
    pub name: String,
    pub author: Option<String>,
    pub file_path: PathBuf, // Relative to the sound directory
    pub tags: BTreeSet<String>,
    pub last_played: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input to `DatabaseBackend::insert`. Backends assign an id when none is given.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub id: Option<SoundId>,
    pub name: String,
    pub author: Option<String>,
    pub file_path: PathBuf,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    pub fn into_metadata(self, id: SoundId) -> AudioMetadata {
        AudioMetadata {
            id,
            name: self.name,
            author: self.author,
            file_path: self.file_path,
            tags: self.tags,
            last_played: None,
            created_at: self.created_at,
        }
    }
}

/// Partial update. Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub last_played: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.tags.is_none() && self.last_played.is_none()
    }

    pub fn apply(self, record: &mut AudioMetadata) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(tags) = self.tags {
            record.tags = tags;
        }
        if let Some(last_played) = self.last_played {
            record.last_played = Some(last_played);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    /// Records must carry every one of these tags
    pub tags: Option<BTreeSet<String>>,
    /// Case-insensitive substring over path, name and tags
    pub text: Option<String>,
    /// Exact name match
    pub name: Option<String>,
}

impl ListFilter {
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn matches_tags(&self, record: &AudioMetadata) -> bool {
        match &self.tags {
            Some(wanted) => wanted.is_subset(&record.tags),
            None => true,
        }
    }

    pub fn matches_text(&self, record: &AudioMetadata) -> bool {
        let Some(text) = &self.text else { return true };
        let needle = text.to_lowercase();

        record
            .file_path
            .to_string_lossy()
            .to_lowercase()
            .contains(&needle)
            || record.name.to_lowercase().contains(&needle)
            || record.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }

    pub fn matches(&self, record: &AudioMetadata) -> bool {
        let name_ok = self.name.as_ref().map_or(true, |n| *n == record.name);
        name_ok && self.matches_tags(record) && self.matches_text(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFilter {
    LowPass,
    HighPass,
    Reverse,
}

impl FromStr for AudioFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lowpass" | "low-pass" => Ok(AudioFilter::LowPass),
            "highpass" | "high-pass" => Ok(AudioFilter::HighPass),
            "reverse" => Ok(AudioFilter::Reverse),
            other => Err(format!(
                "unknown filter '{}' (expected lowpass, highpass or reverse)",
                other
            )),
        }
    }
}

pub const MAX_VOLUME: f32 = 10.0;
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Playback effect parameters handed to the audio player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    pub volume: f32,
    pub speed: f32,
    pub filter: Option<AudioFilter>,
    /// Crop start in seconds
    pub start: Option<f64>,
    /// Crop end in seconds
    pub end: Option<f64>,
}

impl Default for Effects {
    fn default() -> Self {
        Self {
            volume: 1.0,
            speed: 1.0,
            filter: None,
            start: None,
            end: None,
        }
    }
}

impl Effects {
    pub fn validate(&self) -> Result<()> {
        if !self.volume.is_finite() || !(0.0..=MAX_VOLUME).contains(&self.volume) {
            return Err(ArchiveError::InvalidEffects(format!(
                "volume must be between 0 and {}, got {}",
                MAX_VOLUME, self.volume
            )));
        }
        if !self.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ArchiveError::InvalidEffects(format!(
                "speed must be between {} and {}, got {}",
                MIN_SPEED, MAX_SPEED, self.speed
            )));
        }

        let start = self.start.unwrap_or(0.0);
        if !start.is_finite() || start < 0.0 {
            return Err(ArchiveError::InvalidEffects(format!(
                "start must be a non-negative number of seconds, got {}",
                start
            )));
        }
        if let Some(end) = self.end {
            if !end.is_finite() || end <= start {
                return Err(ArchiveError::InvalidEffects(format!(
                    "end ({}) must be greater than start ({})",
                    end, start
                )));
            }
        }
        Ok(())
    }

    /// Length of the cropped region, if an end is set.
    pub fn duration(&self) -> Option<f64> {
        self.end.map(|end| end - self.start.unwrap_or(0.0))
    }

    pub fn is_identity(&self) -> bool {
        *self == Effects::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackResult {
    pub sound: AudioMetadata,
    pub path: PathBuf,
}
