use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;

use rusqlite::{params, Connection};
use tempfile::TempDir;

use crate::reconcile::{FileSystem, LocalFileSystem, ReconcileOptions, ReconcileSummary, Reconciler};
use crate::Result;

static INIT: Once = Once::new();

pub fn init() -> TempDir {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")))
            .with_test_writer()
            .try_init();
    });
    TempDir::new().expect("failed to create temp dir")
}

/// The subset of Kodi's MyVideos schema that the renamer touches.
pub const KODI_SCHEMA: &str = r#"
CREATE TABLE path (
    idPath INTEGER PRIMARY KEY
  , strPath TEXT
);
CREATE TABLE files (
    idFile INTEGER PRIMARY KEY
  , idPath INTEGER
  , strFilename TEXT
);
CREATE TABLE movie (
    idMovie INTEGER PRIMARY KEY
  , idFile INTEGER
  , c00 TEXT
  , c22 TEXT
  , premiered TEXT
);
"#;

/// Aborts every UPDATE on `movie`, so the second statement of a rename transaction fails.
pub const FAIL_MOVIE_UPDATES: &str = r#"
CREATE TRIGGER fail_movie_update BEFORE UPDATE ON movie
BEGIN
    SELECT RAISE(ABORT, 'movie table is read only');
END;
"#;

pub struct Library {
    pub films_dir: PathBuf,
    pub other_dir: PathBuf,
    pub database_dir: PathBuf,
    pub database_path: PathBuf,
    pub sources_file: PathBuf,
}

impl Library {
    pub fn connect(&self) -> Connection {
        Connection::open(&self.database_path).expect("failed to open database")
    }

    pub fn filename_of(&self, file_id: i64) -> String {
        self.connect()
            .query_row("SELECT strFilename FROM files WHERE idFile = ?1", [file_id], |row| row.get(0))
            .expect("failed to read filename")
    }

    pub fn c22_of(&self, movie_id: i64) -> Option<String> {
        self.connect()
            .query_row("SELECT c22 FROM movie WHERE idMovie = ?1", [movie_id], |row| row.get(0))
            .expect("failed to read c22")
    }
}

/// Insert a movie whose file is `filename` inside `dir`. Kodi stores directories with a trailing
/// separator, and so do we. The movie, file and path ids are all `id`.
pub fn add_movie(conn: &Connection, id: i64, title: &str, premiered: Option<&str>, dir: &Path, filename: &str) {
    conn.execute("INSERT INTO path (idPath, strPath) VALUES (?1, ?2)", params![id, format!("{}/", dir.display())])
        .expect("failed to insert path");
    conn.execute("INSERT INTO files (idFile, idPath, strFilename) VALUES (?1, ?1, ?2)", params![id, filename])
        .expect("failed to insert file");
    conn.execute(
        "INSERT INTO movie (idMovie, idFile, c00, c22, premiered) VALUES (?1, ?1, ?2, ?3, ?4)",
        params![id, title, dir.join(filename).to_string_lossy(), premiered],
    )
    .expect("failed to insert movie");
}

/// An empty library: the directories, an empty database and a sources file naming `films_dir`.
pub fn library() -> (Library, TempDir) {
    let temp_dir = init();
    let base = temp_dir.path();

    let films_dir = base.join("media").join("Films");
    let other_dir = base.join("media").join("Other");
    let database_dir = base.join("userdata").join("Database");
    for d in [&films_dir, &other_dir, &database_dir] {
        fs::create_dir_all(d).expect("failed to create dir");
    }

    let database_path = database_dir.join("MyVideos119.db");
    let conn = Connection::open(&database_path).expect("failed to open database");
    conn.execute_batch(KODI_SCHEMA).expect("failed to create schema");

    let sources_file = base.join("userdata").join("sources.xml");
    fs::write(
        &sources_file,
        format!(
            r#"<sources>
    <video>
        <default pathversion="1"></default>
        <source>
            <name>Films</name>
            <path pathversion="1">{}/</path>
        </source>
    </video>
</sources>
"#,
            films_dir.display()
        ),
    )
    .expect("failed to write sources.xml");

    (
        Library {
            films_dir,
            other_dir,
            database_dir,
            database_path,
            sources_file,
        },
        temp_dir,
    )
}

/// A library with files on disk:
///
/// | id | title               | on disk as                 | expected          |
/// |----|---------------------|----------------------------|-------------------|
/// | 1  | The Matrix (1999)   | the.matrix.1999.mkv        | renamed           |
/// | 2  | Avatar (2009)       | Avatar.2009.[3D].SBS.mkv   | renamed, 3D       |
/// | 3  | Alien (1979)        | Alien (1979).avi           | already canonical |
/// | 4  | Mission: Impossible | mi.mkv                     | renamed, `:`      |
/// | 5  | Other               | (outside the roots)        | out of scope      |
/// | 6  | Ghost (1990)        | (not on disk)              | missing           |
///
/// `stray.mkv` sits in the films directory without a record.
pub fn seeded_library() -> (Library, TempDir) {
    let (lib, temp_dir) = library();
    let conn = lib.connect();
    add_movie(&conn, 1, "The Matrix", Some("1999-03-31"), &lib.films_dir, "the.matrix.1999.mkv");
    add_movie(&conn, 2, "Avatar", Some("2009-12-18"), &lib.films_dir, "Avatar.2009.[3D].SBS.mkv");
    add_movie(&conn, 3, "Alien", Some("1979-05-25"), &lib.films_dir, "Alien (1979).avi");
    add_movie(&conn, 4, "Mission: Impossible", Some("1996-05-22"), &lib.films_dir, "mi.mkv");
    add_movie(&conn, 5, "Other", Some("2001"), &lib.other_dir, "other.mkv");
    add_movie(&conn, 6, "Ghost", Some("1990"), &lib.films_dir, "ghost.mkv");

    for f in ["the.matrix.1999.mkv", "Avatar.2009.[3D].SBS.mkv", "Alien (1979).avi", "mi.mkv", "stray.mkv"] {
        fs::write(lib.films_dir.join(f), "").expect("failed to create file");
    }
    fs::write(lib.other_dir.join("other.mkv"), "").expect("failed to create file");

    (lib, temp_dir)
}

/// Delegates to the real filesystem but refuses to rename anything away from the listed paths.
#[derive(Default)]
pub struct FaultyFileSystem {
    pub fail_renames_from: HashSet<PathBuf>,
}

impl FaultyFileSystem {
    pub fn failing_from(paths: &[&Path]) -> Self {
        Self {
            fail_renames_from: paths.iter().map(|p| p.to_path_buf()).collect(),
        }
    }
}

impl FileSystem for FaultyFileSystem {
    fn exists(&self, path: &Path) -> bool {
        LocalFileSystem.exists(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.fail_renames_from.contains(from) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission revoked"));
        }
        LocalFileSystem.rename(from, to)
    }

    fn list_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        LocalFileSystem.list_files(root)
    }
}

pub struct RunOutput {
    pub result: Result<ReconcileSummary>,
    pub out: String,
    pub err: String,
}

/// Run the reconciler against the library's database with `roots`, capturing both report streams.
pub fn run_reconcile_with<F: FileSystem>(lib: &Library, fs: &F, roots: &[PathBuf], options: ReconcileOptions) -> RunOutput {
    let mut conn = lib.connect();
    let mut out = Vec::new();
    let mut err = Vec::new();
    let result = Reconciler::new(&mut conn, fs, roots, options, &mut out, &mut err).run();
    RunOutput {
        result,
        out: String::from_utf8(out).expect("stdout is not utf-8"),
        err: String::from_utf8(err).expect("stderr is not utf-8"),
    }
}

pub fn run_reconcile(lib: &Library, options: ReconcileOptions) -> RunOutput {
    run_reconcile_with(lib, &LocalFileSystem, &[lib.films_dir.clone()], options)
}
