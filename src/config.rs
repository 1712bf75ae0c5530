//! The config module builds the run configuration: the built-in Kodi profiles, an optional TOML
//! override file, and the command-line options. The result is an immutable value handed to the
//! resolver, the locator and the reconciliation engine.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::common::normalize_path;
use crate::error::{RenamerExpectedError, Result};

pub const DEFAULT_SOURCE_CATEGORY: &str = "video";
pub const DEFAULT_SOURCE_NAME: &str = "Films";

const KODI_SOURCES_FILE: &str = "/storage/.kodi/userdata/sources.xml";
const KODI_DATABASE_DIR: &str = "/storage/.kodi/userdata/Database";
const LOCAL_SOURCES_FILE: &str = "/mnt/mediauserdata/sources.xml";
const LOCAL_DATABASE_DIR: &str = "/mnt/mediauserdata/Database";
const LOCAL_MOUNT_FROM: &str = "/media/HD1";
const LOCAL_MOUNT_TO: &str = "/mnt/mediacenter";

const KNOWN_KEYS: &[&str] = &["source_category", "source_name", "exclude_paths", "kodi", "local"];

/// Translates paths as Kodi records them into the view mounted on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSubstitution {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl MountSubstitution {
    pub fn new(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Self {
        Self {
            from: normalize_path(from),
            to: normalize_path(to),
        }
    }

    /// Map a path in the database view onto the local mount. Paths outside `from` are unchanged.
    pub fn to_local(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.from) {
            Ok(rest) if rest.as_os_str().is_empty() => self.to.clone(),
            Ok(rest) => self.to.join(rest),
            Err(_) => path.to_path_buf(),
        }
    }
}

/// Options that come from the command line rather than from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub local: bool,
    pub exclude_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sources_file: PathBuf,
    pub database_dir: PathBuf,
    pub source_category: String,
    pub source_name: String,
    /// Only set in local mode.
    pub mount_substitution: Option<MountSubstitution>,
    pub exclude_paths: Vec<String>,
    pub dry_run: bool,
    pub local: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileFile {
    sources_file: Option<String>,
    database_dir: Option<String>,
    mount_from: Option<String>,
    mount_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    source_category: Option<String>,
    source_name: Option<String>,
    #[serde(default)]
    exclude_paths: Vec<String>,
    kodi: Option<ProfileFile>,
    local: Option<ProfileFile>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kodi-renamer").join("config.toml"))
}

fn expand(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).into_owned())
}

impl Config {
    /// Build the configuration. With no override, a missing default configuration file simply means
    /// the built-in profile is used; an explicitly requested file must exist.
    pub fn parse(config_path_override: Option<&Path>, options: &RunOptions) -> Result<Config> {
        let file = match config_path_override {
            Some(path) => {
                if !path.is_file() {
                    return Err(RenamerExpectedError::ConfigNotFound { path: path.to_path_buf() }.into());
                }
                Some(read_config_file(path)?)
            }
            None => match default_config_path() {
                Some(path) if path.is_file() => Some(read_config_file(&path)?),
                _ => None,
            },
        };
        let (cfgpath, file) = match file {
            Some((cfgpath, file)) => (cfgpath, file),
            None => (PathBuf::new(), ConfigFile::default()),
        };

        let (profile, default_sources, default_database, default_mount) = if options.local {
            (file.local, LOCAL_SOURCES_FILE, LOCAL_DATABASE_DIR, Some((LOCAL_MOUNT_FROM, LOCAL_MOUNT_TO)))
        } else {
            (file.kodi, KODI_SOURCES_FILE, KODI_DATABASE_DIR, None)
        };
        let profile = profile.unwrap_or_default();

        let sources_file = profile.sources_file.as_deref().map(expand).unwrap_or_else(|| PathBuf::from(default_sources));
        let database_dir = profile.database_dir.as_deref().map(expand).unwrap_or_else(|| PathBuf::from(default_database));

        let mount_substitution = match (profile.mount_from.as_deref(), profile.mount_to.as_deref()) {
            (Some(from), Some(to)) => Some(MountSubstitution::new(expand(from), expand(to))),
            (None, None) => default_mount.map(|(from, to)| MountSubstitution::new(from, to)),
            (Some(_), None) | (None, Some(_)) => {
                return Err(RenamerExpectedError::InvalidConfigValue {
                    path: cfgpath,
                    key: "mount_from/mount_to".to_string(),
                    message: "must specify both or neither".to_string(),
                }
                .into());
            }
        };

        let source_category = file.source_category.unwrap_or_else(|| DEFAULT_SOURCE_CATEGORY.to_string());
        let source_name = file.source_name.unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string());
        for (key, value) in [("source_category", &source_category), ("source_name", &source_name)] {
            if value.trim().is_empty() {
                return Err(RenamerExpectedError::InvalidConfigValue {
                    path: cfgpath,
                    key: key.to_string(),
                    message: "must be a non-empty string".to_string(),
                }
                .into());
            }
        }

        let mut exclude_paths = file.exclude_paths;
        exclude_paths.extend(options.exclude_paths.iter().cloned());

        let config = Config {
            sources_file,
            database_dir,
            source_category,
            source_name,
            mount_substitution,
            exclude_paths,
            dry_run: options.dry_run,
            local: options.local,
        };
        debug!("loaded configuration: {:?}", config);
        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<(PathBuf, ConfigFile)> {
    let text = fs::read_to_string(path).map_err(|_| RenamerExpectedError::ConfigNotFound { path: path.to_path_buf() })?;
    let table: toml::Table = toml::from_str(&text).map_err(|e| RenamerExpectedError::ConfigDecode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    for key in table.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warn!("Unrecognized key {} in configuration file ({})", key, path.display());
        }
    }
    let file: ConfigFile = toml::Value::Table(table).try_into().map_err(|e: toml::de::Error| {
        RenamerExpectedError::InvalidConfigValue {
            path: path.to_path_buf(),
            key: "configuration".to_string(),
            message: e.to_string(),
        }
    })?;
    Ok((path.to_path_buf(), file))
}
