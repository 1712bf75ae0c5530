use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenamerError {
    #[error(transparent)]
    Expected(#[from] RenamerExpectedError),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The file carries its new name on disk while the database still references the old one.
    #[error("Database not updated and error undoing rename: {} -> {}", .old.display(), .new.display())]
    Divergence { old: PathBuf, new: PathBuf },
}

#[derive(Error, Debug)]
pub enum RenamerExpectedError {
    #[error("Db file doesn't exist")]
    DatabaseNotFound { dir: PathBuf },
    #[error("Db file doesn't have write access")]
    DatabaseNotWritable { path: PathBuf },
    #[error("Sources file not found: {path}")]
    SourcesNotFound { path: PathBuf },
    #[error("Failed to decode sources file {path}: {message}")]
    SourcesDecode { path: PathBuf, message: String },
    #[error("Configuration file not found ({path})")]
    ConfigNotFound { path: PathBuf },
    #[error("Failed to decode configuration file ({path}): invalid TOML: {message}")]
    ConfigDecode { path: PathBuf, message: String },
    #[error("Invalid value for {key} in configuration file ({path}): {message}")]
    InvalidConfigValue { path: PathBuf, key: String, message: String },
}

impl RenamerError {
    /// Process exit status for this error. Expected errors happen before any mutation.
    pub fn exit_code(&self) -> u8 {
        match self {
            RenamerError::Expected(_) => 1,
            _ => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, RenamerError>;
