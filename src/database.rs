//! The database module wraps Kodi's video library: locating the newest `MyVideos<N>.db`, opening
//! it, and the handful of statements the reconciliation engine needs.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OpenFlags, Row, Transaction};
use tracing::{debug, info};

use crate::error::{RenamerExpectedError, Result};

static DATABASE_FILE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^MyVideos(\d+)\.db$").unwrap());

/// One movie joined with its file and containing directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub id: i64,
    pub title: String,
    pub year: Option<String>,
    pub file_id: i64,
    pub filename: String,
    pub directory: String,
}

impl MediaRecord {
    fn from_row(row: &Row) -> rusqlite::Result<MediaRecord> {
        Ok(MediaRecord {
            id: row.get("id")?,
            title: row.get::<_, Option<String>>("title")?.unwrap_or_default(),
            year: row.get("year")?,
            file_id: row.get("idFile")?,
            filename: row.get("strFilename")?,
            directory: row.get("strPath")?,
        })
    }
}

/// Version number encoded in a `MyVideos<N>.db` filename.
pub fn database_version(filename: &str) -> Option<u64> {
    DATABASE_FILE_REGEX.captures(filename).and_then(|c| c[1].parse().ok())
}

/// Find the video database with the highest version in `dir`. A missing directory yields `None`.
pub fn find_database(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut best: Option<(u64, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let filename = entry.file_name();
        let Some(version) = database_version(&filename.to_string_lossy()) else {
            continue;
        };
        if best.as_ref().map_or(true, |(v, _)| version > *v) {
            best = Some((version, entry.path()));
        }
    }
    if let Some((version, path)) = &best {
        debug!("selected video database version {} at {}", version, path.display());
    }
    Ok(best.map(|(_, path)| path))
}

/// Locate the database and make sure it is usable for this run. Writability is only required when
/// the run will mutate.
pub fn locate_database(dir: &Path, dry_run: bool) -> Result<PathBuf> {
    let path = match find_database(dir)? {
        Some(path) if path.is_file() => path,
        _ => return Err(RenamerExpectedError::DatabaseNotFound { dir: dir.to_path_buf() }.into()),
    };
    if !dry_run && OpenOptions::new().write(true).open(&path).is_err() {
        return Err(RenamerExpectedError::DatabaseNotWritable { path }.into());
    }
    info!("using video database {}", path.display());
    Ok(path)
}

/// Open the database. Dry runs never write, so they get a read-only handle.
pub fn connect(path: &Path, dry_run: bool) -> Result<Connection> {
    let conn = if dry_run {
        Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)?
    } else {
        Connection::open(path)?
    };
    conn.execute_batch("PRAGMA busy_timeout = 15000;")?;
    Ok(conn)
}

pub fn list_movies(conn: &Connection) -> Result<Vec<MediaRecord>> {
    let mut stmt = conn.prepare(
        "SELECT idMovie AS id, c00 AS title, substr(premiered, 1, 4) AS year, idFile, strFilename, strPath
         FROM movie
         JOIN files USING (idFile)
         JOIN path USING (idPath)
         ORDER BY idMovie",
    )?;
    let records = stmt.query_map([], MediaRecord::from_row)?.collect::<std::result::Result<Vec<_>, _>>()?;
    debug!("read {} movie record(s)", records.len());
    Ok(records)
}

/// Point the record at its new filename. Runs inside the caller's transaction.
pub fn update_movie_filename(tx: &Transaction, record: &MediaRecord, new_filename: &str, new_full_path: &Path) -> rusqlite::Result<()> {
    tx.execute("UPDATE files SET strFilename = ?1 WHERE idFile = ?2", params![new_filename, record.file_id])?;
    tx.execute(
        "UPDATE movie SET c22 = ?1 WHERE idMovie = ?2",
        params![new_full_path.to_string_lossy(), record.id],
    )?;
    Ok(())
}
