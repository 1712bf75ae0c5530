use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use kodi_renamer::common::{initialize_logging, LogOutput, VERSION};
use kodi_renamer::config::{Config, RunOptions};
use kodi_renamer::database::{self, locate_database};
use kodi_renamer::sources::resolve_source_paths;
use kodi_renamer::{LocalFileSystem, ReconcileOptions, Reconciler, Result};

/// Rename movie files to "Title (Year).ext" based on the Kodi video database.
#[derive(Debug, Parser)]
#[command(name = "kodi-renamer", version = VERSION)]
#[command(
    long_about = "Rename files based on the Kodi video database. The list of changed files is written to stdout. \
    Errors are written to stderr and the program exits normally, unless file renames and the database are left \
    in a state of no longer matching; in that case the program stops immediately with exit code 3."
)]
struct Cli {
    /// Don't rename any files or update the database, only print files which would be renamed
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Use the locally mounted view of the Kodi userdata and media
    #[arg(short, long)]
    local: bool,

    /// Source path to exclude (repeatable)
    #[arg(short, long = "exclude-path", value_name = "PATH")]
    exclude_path: Vec<String>,

    /// Configuration file overriding the built-in paths
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to the state directory instead of stderr
    #[arg(long)]
    log_file: bool,
}

fn run(cli: &Cli) -> Result<()> {
    let options = RunOptions {
        dry_run: cli.dry_run,
        local: cli.local,
        exclude_paths: cli.exclude_path.clone(),
    };
    let config = Config::parse(cli.config.as_deref(), &options)?;

    let roots = resolve_source_paths(&config.sources_file, &config.source_category, &config.source_name, &config.exclude_paths)?;
    let database_path = locate_database(&config.database_dir, config.dry_run)?;
    let mut conn = database::connect(&database_path, config.dry_run)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut err = io::stderr();
    let summary = Reconciler::new(&mut conn, &LocalFileSystem, &roots, ReconcileOptions::from_config(&config), &mut out, &mut err).run()?;
    debug!("{} record(s) processed", summary.outcomes.len());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let output = if cli.log_file { LogOutput::File } else { LogOutput::Stderr };
    let _guard = match initialize_logging(output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
