//! The common module is our grab bag of small helpers shared by the resolver, the locator and the
//! reconciliation engine: lexical path handling and logging setup.
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lexically normalize a path: collapse repeated separators, drop `.` components and trailing
/// separators, and resolve `..` against the preceding component. The filesystem is not consulted.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Split a filename into stem and extension, the extension keeping its leading dot. Leading dots
/// of a hidden file do not start an extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if name[..pos].chars().any(|c| c != '.') => name.split_at(pos),
        _ => (name, ""),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
}

static LOGGING_INITIALIZED: Mutex<bool> = Mutex::new(false);

/// Install the global tracing subscriber. Returns the appender guard when logging to a file; the
/// caller must keep it alive until exit or buffered lines are lost.
pub fn initialize_logging(output: LogOutput) -> anyhow::Result<Option<WorkerGuard>> {
    {
        let mut initialized = LOGGING_INITIALIZED.lock().map_err(|_| anyhow::anyhow!("logging lock poisoned"))?;
        if *initialized {
            return Ok(None);
        }
        *initialized = true;
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match output {
        LogOutput::Stderr => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
            Ok(None)
        }
        LogOutput::File => {
            let proj_dirs = ProjectDirs::from("", "", "kodi-renamer")
                .ok_or_else(|| anyhow::anyhow!("Failed to get project directories"))?;
            let log_dir = if cfg!(target_os = "macos") {
                proj_dirs.cache_dir()
            } else {
                proj_dirs.state_dir().unwrap_or(proj_dirs.cache_dir())
            };
            fs::create_dir_all(log_dir)?;

            let file_appender = tracing_appender::rolling::never(log_dir, "kodi-renamer.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
            Ok(Some(guard))
        }
    }
}
