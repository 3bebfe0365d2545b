//! Command-line front end: argument parsing, dispatch and output formatting.

use crate::commander::Commander;
use crate::config::ArchiveConfig;
use crate::db::{open_backend, BackendKind};
use crate::error::{ArchiveError, Result};
use crate::models::{AudioFilter, AudioMetadata, Effects, ListFilter, SoundId};
use crate::player::{CommandPlayer, CommandRenderer};
use crate::storage::Storage;
use crate::tags::split_tag_list;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sound-archive", version, about = "Archive, tag and play sound files")]
pub struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Archive root holding sounds and metadata
    #[arg(long, env = "SOUND_ARCHIVE_DIR", global = true)]
    pub archive_dir: Option<PathBuf>,

    /// Metadata backend: sqlite or json
    #[arg(long, env = "SOUND_ARCHIVE_BACKEND", global = true)]
    pub backend: Option<BackendKind>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Copy a sound file into the archive
    Add {
        file: PathBuf,
        /// Defaults to the file name without extension
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        author: Option<String>,
        /// Tag to attach; repeat or separate with ';'
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List sounds, optionally filtered
    List {
        /// Only sounds carrying all of these tags
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Case-insensitive text match on name, path and tags
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one sound
    Info { sound: String },
    /// Sounds whose names are closest to TARGET
    Search {
        target: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
    /// Play one or more sounds in order
    Play {
        #[arg(required = true)]
        sounds: Vec<String>,
        /// Play all sounds at once instead of one after another
        #[arg(long)]
        parallel: bool,
        #[command(flatten)]
        effects: EffectArgs,
    },
    /// Archive an edited copy of a sound under a new name
    Save {
        sound: String,
        name: String,
        #[command(flatten)]
        effects: EffectArgs,
        /// Extra tag for the copy; repeat or separate with ';'
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Add or remove tags
    Tag {
        sound: String,
        #[arg(short, long)]
        add: Vec<String>,
        #[arg(short, long)]
        remove: Vec<String>,
    },
    Rename { sound: String, name: String },
    /// Delete a sound's file and record
    Remove { sound: String },
    /// Drop records whose file is gone
    Clean {
        /// Also delete files no record points at
        #[arg(long)]
        orphans: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct EffectArgs {
    #[arg(long, default_value_t = 1.0)]
    pub volume: f32,
    #[arg(long, default_value_t = 1.0)]
    pub speed: f32,
    /// lowpass, highpass or reverse
    #[arg(long)]
    pub filter: Option<AudioFilter>,
    /// Start offset in seconds
    #[arg(long)]
    pub start: Option<f64>,
    /// End offset in seconds
    #[arg(long)]
    pub end: Option<f64>,
}

impl From<EffectArgs> for Effects {
    fn from(args: EffectArgs) -> Self {
        Effects {
            volume: args.volume,
            speed: args.speed,
            filter: args.filter,
            start: args.start,
            end: args.end,
        }
    }
}

/// Wire backend, storage and player together from configuration.
pub fn open_commander(config: &ArchiveConfig) -> Result<Commander> {
    let backend = open_backend(config.backend, &config.archive_dir)?;
    let storage = Storage::open(config.sound_dir(), backend)?;
    let player = CommandPlayer::new(config.player.clone()).with_args(config.player_args.clone());
    let renderer = CommandRenderer::new(config.renderer.clone());
    Ok(Commander::new(storage, Box::new(player)).with_renderer(Box::new(renderer)))
}

/// Exit code for unusable command-line arguments, distinct from the
/// integrity-warning code.
pub const USAGE_EXIT_CODE: u8 = 64;

/// Exit code for a failed parse; help and version output are not failures.
pub fn parse_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        USAGE_EXIT_CODE
    } else {
        0
    }
}

/// Process exit code for a failed command.
pub fn exit_code(err: &ArchiveError) -> u8 {
    if err.is_integrity_warning() {
        2
    } else {
        1
    }
}

pub fn dispatch(command: Command, commander: &mut Commander, json: bool, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Add { file, name, author, tags } => {
            let sound = commander.add(
                &file,
                split_tag_list(&tags),
                name.as_deref(),
                author.as_deref(),
            )?;
            print_one(out, &sound, json)
        }
        Command::List { tags, search } => {
            let filter = ListFilter {
                tags: (!tags.is_empty()).then(|| split_tag_list(&tags).into_iter().collect()),
                text: search,
                name: None,
            };
            print_many(out, &commander.list(&filter)?, json)
        }
        Command::Info { sound } => {
            let id = commander.lookup(&sound)?;
            print_one(out, &commander.get(id)?, json)
        }
        Command::Search { target, limit } => {
            print_many(out, &commander.fuzzy_search(&target, limit)?, json)
        }
        Command::Play { sounds, parallel, effects } => {
            let ids = sounds
                .iter()
                .map(|s| commander.lookup(s))
                .collect::<Result<Vec<SoundId>>>()?;
            let effects: Effects = effects.into();

            let (played, failure) = if parallel {
                let mut played = Vec::new();
                let mut failure = None;
                for outcome in commander.play_parallel(&ids, &effects)? {
                    match outcome {
                        Ok(result) => played.push(result),
                        Err(e) => {
                            failure.get_or_insert(e);
                        }
                    }
                }
                (played, failure)
            } else {
                (commander.play_sequence(&ids, &effects)?, None)
            };

            if json {
                emit_json(out, &played)?;
            } else {
                for result in &played {
                    writeln!(out, "played {} ({})", result.sound.name, result.path.display())?;
                }
            }
            failure.map_or(Ok(()), Err)
        }
        Command::Save { sound, name, effects, tags } => {
            let id = commander.lookup(&sound)?;
            let saved = commander.save(id, &effects.into(), &name, split_tag_list(&tags))?;
            print_one(out, &saved, json)
        }
        Command::Tag { sound, add, remove } => {
            let id = commander.lookup(&sound)?;
            let updated = commander.tag(id, split_tag_list(&add), split_tag_list(&remove))?;
            print_one(out, &updated, json)
        }
        Command::Rename { sound, name } => {
            let id = commander.lookup(&sound)?;
            print_one(out, &commander.rename(id, &name)?, json)
        }
        Command::Remove { sound } => {
            let id = commander.lookup(&sound)?;
            commander.remove(id)?;
            if json {
                return emit_json(out, &serde_json::json!({ "removed": id }));
            }
            writeln!(out, "removed {}", id)?;
            Ok(())
        }
        Command::Clean { orphans } => {
            let removed = commander.clean()?;
            let files = if orphans {
                commander.remove_orphans()?
            } else {
                Vec::new()
            };

            if json {
                return emit_json(
                    out,
                    &serde_json::json!({ "removed_records": removed, "removed_files": files }),
                );
            }
            for sound in &removed {
                writeln!(out, "removed record without file: {}", format_sound(sound))?;
            }
            for file in &files {
                writeln!(out, "deleted orphaned file: {}", file.display())?;
            }
            if !orphans {
                let left = commander.orphans()?;
                if !left.is_empty() {
                    writeln!(
                        out,
                        "{} orphaned file(s) in {}; run `clean --orphans` to delete them",
                        left.len(),
                        commander.storage().sound_dir().display()
                    )?;
                }
            }
            Ok(())
        }
    }
}

pub fn format_sound(sound: &AudioMetadata) -> String {
    let tags = sound.tags.iter().cloned().collect::<Vec<_>>().join(", ");
    let author = sound
        .author
        .as_deref()
        .map(|a| format!(" by {}", a))
        .unwrap_or_default();
    let played = sound
        .last_played
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{}  {}{}  [{}]  last played: {}",
        sound.id, sound.name, author, tags, played
    )
}

fn emit_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    writeln!(out, "{}", text)?;
    Ok(())
}

fn print_one(out: &mut dyn Write, sound: &AudioMetadata, json: bool) -> Result<()> {
    if json {
        return emit_json(out, sound);
    }
    writeln!(out, "{}", format_sound(sound))?;
    Ok(())
}

fn print_many(out: &mut dyn Write, sounds: &[AudioMetadata], json: bool) -> Result<()> {
    if json {
        return emit_json(out, sounds);
    }
    if sounds.is_empty() {
        writeln!(out, "no sounds")?;
    }
    for sound in sounds {
        writeln!(out, "{}", format_sound(sound))?;
    }
    Ok(())
}
