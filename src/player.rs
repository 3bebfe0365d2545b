//! Playback and rendering collaborators.
//!
//! The archive never decodes audio itself. It hands a resolved file path and
//! the requested effects to an `AudioPlayer`, which reports success or
//! failure. `CommandPlayer` does this by running an ffplay-compatible program
//! and waiting for it to exit. `CommandRenderer` runs ffmpeg with the same
//! filter chain to write the edited audio to a new file.

use crate::error::{ArchiveError, Result};
use crate::models::{AudioFilter, Effects};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

pub const DEFAULT_PLAYER: &str = "ffplay";
pub const DEFAULT_RENDERER: &str = "ffmpeg";

/// Cutoff used by the low/high-pass filters, in Hz
const FILTER_CUTOFF_HZ: u32 = 1000;

pub trait AudioPlayer {
    /// Play `path` to completion with `effects` applied.
    fn play(&mut self, path: &Path, effects: &Effects) -> Result<()>;

    /// Play every path at once and wait until all have finished.
    ///
    /// Returns one result per path, in order. The default implementation
    /// cannot overlap playback and plays them one after another.
    fn play_all(&mut self, paths: &[PathBuf], effects: &Effects) -> Vec<Result<()>> {
        paths.iter().map(|path| self.play(path, effects)).collect()
    }
}

pub trait AudioRenderer {
    /// Write `source` with `effects` applied to `dest`, replacing `dest`.
    fn render(&mut self, source: &Path, effects: &Effects, dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    extra_args: Vec<String>,
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER)
    }
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }

    /// Full argument list for one playback, path last.
    pub fn build_args(&self, path: &Path, effects: &Effects) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-nodisp", "-autoexit", "-loglevel", "error"]
            .iter()
            .map(OsString::from)
            .collect();
        args.extend(self.extra_args.iter().map(OsString::from));

        push_crop_args(&mut args, effects);
        push_filter_args(&mut args, effects);
        args.push(path.as_os_str().to_os_string());
        args
    }

    fn command(&self, path: &Path, effects: &Effects) -> Command {
        let args = self.build_args(path, effects);
        tracing::debug!(program = %self.program, ?args, "starting playback");
        let mut cmd = Command::new(&self.program);
        cmd.args(&args).stdin(Stdio::null());
        cmd
    }
}

fn push_crop_args(args: &mut Vec<OsString>, effects: &Effects) {
    if let Some(start) = effects.start {
        args.push("-ss".into());
        args.push(start.to_string().into());
    }
    if let Some(duration) = effects.duration() {
        args.push("-t".into());
        args.push(duration.to_string().into());
    }
}

fn push_filter_args(args: &mut Vec<OsString>, effects: &Effects) {
    let chain = filter_chain(effects);
    if !chain.is_empty() {
        args.push("-af".into());
        args.push(chain.join(",").into());
    }
}

/// Map a finished child process to success or a `Playback` error.
fn check_exit(program: &str, output: io::Result<Output>) -> Result<()> {
    let output = output
        .map_err(|e| ArchiveError::Playback(format!("failed to run '{}': {}", program, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ArchiveError::Playback(format!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

fn filter_chain(effects: &Effects) -> Vec<String> {
    let mut chain = Vec::new();
    if effects.volume != 1.0 {
        chain.push(format!("volume={}", effects.volume));
    }
    if effects.speed != 1.0 {
        chain.push(format!("atempo={}", effects.speed));
    }
    match effects.filter {
        Some(AudioFilter::LowPass) => chain.push(format!("lowpass=f={}", FILTER_CUTOFF_HZ)),
        Some(AudioFilter::HighPass) => chain.push(format!("highpass=f={}", FILTER_CUTOFF_HZ)),
        Some(AudioFilter::Reverse) => chain.push("areverse".to_string()),
        None => {}
    }
    chain
}

impl AudioPlayer for CommandPlayer {
    fn play(&mut self, path: &Path, effects: &Effects) -> Result<()> {
        check_exit(&self.program, self.command(path, effects).output())
    }

    fn play_all(&mut self, paths: &[PathBuf], effects: &Effects) -> Vec<Result<()>> {
        // Start everything first so the sounds overlap. stderr is inherited:
        // piping it could stall one child while another is being waited on.
        let children: Vec<io::Result<Child>> = paths
            .iter()
            .map(|path| {
                self.command(path, effects)
                    .stdout(Stdio::null())
                    .stderr(Stdio::inherit())
                    .spawn()
            })
            .collect();

        children
            .into_iter()
            .map(|child| check_exit(&self.program, child.and_then(Child::wait_with_output)))
            .collect()
    }
}

/// Renders edited audio with an ffmpeg-compatible program.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
}

impl Default for CommandRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_RENDERER)
    }
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Crop options go before `-i` so ffmpeg seeks the input.
    pub fn build_args(&self, source: &Path, effects: &Effects, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
            .iter()
            .map(OsString::from)
            .collect();
        push_crop_args(&mut args, effects);
        args.push("-i".into());
        args.push(source.as_os_str().to_os_string());
        push_filter_args(&mut args, effects);
        args.push(dest.as_os_str().to_os_string());
        args
    }
}

impl AudioRenderer for CommandRenderer {
    fn render(&mut self, source: &Path, effects: &Effects, dest: &Path) -> Result<()> {
        let args = self.build_args(source, effects, dest);
        tracing::debug!(program = %self.program, ?args, "rendering");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output();
        check_exit(&self.program, output)
    }
}
