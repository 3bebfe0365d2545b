use crate::error::{ArchiveError, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Maximum size per log file before rotation (~5 MB)
const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;
/// Number of rotated log files to keep
const MAX_LOG_FILES: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Force debug output regardless of `RUST_LOG`
    pub debug: bool,
    /// Persistent log file, in addition to stderr
    pub file: Option<PathBuf>,
}

pub fn build_filter(settings: &LogSettings) -> EnvFilter {
    if settings.debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&settings.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber: stderr always, plus the log file if set.
pub fn init(settings: &LogSettings) -> Result<()> {
    let file_layer = match &settings.file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| ArchiveError::Config(format!("failed to initialise logging: {}", e)))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    rotate_if_needed(path, MAX_LOG_FILE_SIZE, MAX_LOG_FILES);

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    // Session marker
    writeln!(
        file,
        "=== sound-archive session started at {} ===",
        Local::now().format("%Y-%m-%d %H:%M:%S %Z")
    )?;
    Ok(file)
}

/// `archive.log` -> `archive.<n>.log`
fn rotated_path(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sound-archive".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}.{}", stem, n),
    };
    path.with_file_name(name)
}

/// Rotate log files: x.log → x.1.log → x.2.log → …
/// Returns true if the current file was rotated away.
fn rotate_if_needed(path: &Path, max_size: u64, max_files: usize) -> bool {
    let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if file_size < max_size {
        return false;
    }

    // Shift existing rotated files; the oldest is overwritten
    for i in (1..max_files).rev() {
        let _ = fs::rename(rotated_path(path, i), rotated_path(path, i + 1));
    }
    fs::rename(path, rotated_path(path, 1)).is_ok()
}
