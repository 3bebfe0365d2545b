use anyhow::Context;
use clap::Parser;
use sound_archive::cli::{self, Cli};
use sound_archive::config::{ArchiveConfig, Overrides};
use sound_archive::logging::{self, LogSettings};
use sound_archive::ArchiveError;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version land here too, on stdout
            let _ = err.print();
            return ExitCode::from(cli::parse_exit_code(&err));
        }
    };
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<ArchiveError>()
                .map(cli::exit_code)
                .unwrap_or(1);
            if code == 2 {
                eprintln!("warning: {:#}", err);
            } else {
                eprintln!("error: {:#}", err);
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ArchiveConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .apply(Overrides {
            archive_dir: cli.archive_dir.clone(),
            backend: cli.backend,
        });

    logging::init(&LogSettings {
        level: config.log_level.clone(),
        debug: cli.verbose,
        file: config.log_file.clone(),
    })?;
    tracing::debug!(
        archive_dir = %config.archive_dir.display(),
        backend = %config.backend,
        "opening archive"
    );

    let mut commander = cli::open_commander(&config)
        .with_context(|| format!("failed to open archive at {}", config.archive_dir.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli::dispatch(cli.command, &mut commander, cli.json, &mut out)?;
    Ok(())
}
