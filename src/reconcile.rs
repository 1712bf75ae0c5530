//! The reconcile module renames movie files to their canonical names and keeps Kodi's database in
//! step with the filesystem.
//!
//! Every record is its own unit of work:
//!
//! ```text
//! PLANNED -> RENAMED -> COMMITTED
//! PLANNED -> RENAMED -> ROLLED_BACK -> REVERTED
//! PLANNED -> RENAMED -> ROLLED_BACK -> STUCK      (aborts the whole run)
//! ```
//!
//! A record that is skipped, or that is only reported under a dry run, stays in `PLANNED`.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::canonical::canonical_filename;
use crate::common::normalize_path;
use crate::config::{Config, MountSubstitution};
use crate::database::{self, MediaRecord};
use crate::error::{RenamerError, Result};

/// The filesystem operations the engine performs. Paths handed to these methods are already in the
/// local view.
pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Regular files below `root`, relative to it.
    fn list_files(&self, root: &Path) -> io::Result<Vec<PathBuf>>;
}

pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        // A dangling symlink still occupies the name.
        fs::symlink_metadata(path).is_ok()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn list_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                // The root itself must be readable.
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!("skipping unreadable entry while listing {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
        Ok(files)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub dry_run: bool,
    pub local: bool,
    pub mount_substitution: Option<MountSubstitution>,
}

impl ReconcileOptions {
    pub fn from_config(c: &Config) -> Self {
        Self {
            dry_run: c.dry_run,
            local: c.local,
            mount_substitution: c.mount_substitution.clone(),
        }
    }

    /// Where a database-view path lives on this machine.
    fn local_view(&self, path: &Path) -> PathBuf {
        match &self.mount_substitution {
            Some(substitution) => substitution.to_local(path),
            None => path.to_path_buf(),
        }
    }
}

/// Old and new location of one record's file, in the database view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub record: MediaRecord,
    pub root: PathBuf,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub new_filename: String,
}

impl RenamePlan {
    pub fn is_canonical(&self) -> bool {
        self.old_path == self.new_path
    }
}

/// Plan the rename of a record, or `None` when its directory is under none of the roots. The first
/// matching root wins.
pub fn plan_rename(record: MediaRecord, roots: &[PathBuf]) -> Option<RenamePlan> {
    let directory = normalize_path(&record.directory);
    let root = roots.iter().find(|root| directory.starts_with(root))?.clone();
    let new_filename = canonical_filename(&record.title, record.year.as_deref(), &record.filename);
    Some(RenamePlan {
        old_path: directory.join(&record.filename),
        new_path: directory.join(&new_filename),
        new_filename,
        root,
        record,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    OutOfScope,
    Missing { old: PathBuf },
    AlreadyCanonical,
    Conflict { old: PathBuf, new: PathBuf },
    DryRun { old: PathBuf, new: PathBuf },
    RenameFailed { old: PathBuf, new: PathBuf, error: String },
    Committed { old: PathBuf, new: PathBuf },
    Reverted { old: PathBuf, new: PathBuf, error: String },
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    /// Outcome per movie id, in database order.
    pub outcomes: Vec<(i64, RecordOutcome)>,
    /// Files under a root that no record claims, in the database view.
    pub unmatched: Vec<PathBuf>,
}

impl ReconcileSummary {
    pub fn outcome(&self, movie_id: i64) -> Option<&RecordOutcome> {
        self.outcomes.iter().find(|(id, _)| *id == movie_id).map(|(_, o)| o)
    }

    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, RecordOutcome::Committed { .. })).count()
    }
}

pub struct Reconciler<'a, F: FileSystem> {
    conn: &'a mut Connection,
    fs: &'a F,
    roots: &'a [PathBuf],
    options: ReconcileOptions,
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
}

impl<'a, F: FileSystem> Reconciler<'a, F> {
    /// `out` receives the rename report and the unmatched-file list; `err` receives per-record
    /// problems.
    pub fn new(conn: &'a mut Connection, fs: &'a F, roots: &'a [PathBuf], options: ReconcileOptions, out: &'a mut dyn Write, err: &'a mut dyn Write) -> Self {
        Self {
            conn,
            fs,
            roots,
            options,
            out,
            err,
        }
    }

    /// Reconcile every movie record. Stops at the first fatal divergence; every other failure is
    /// reported and the run carries on.
    pub fn run(&mut self) -> Result<ReconcileSummary> {
        let mut unmatched = self.seed_unmatched()?;
        let records = database::list_movies(&*self.conn)?;

        let mut summary = ReconcileSummary::default();
        for record in records {
            let movie_id = record.id;
            let outcome = self.reconcile_record(record, &mut unmatched)?;
            summary.outcomes.push((movie_id, outcome));
        }

        summary.unmatched = unmatched.into_iter().collect();
        if !summary.unmatched.is_empty() {
            writeln!(self.out, "Files not in mediatech :")?;
            for path in &summary.unmatched {
                writeln!(self.out, "{}", path.display())?;
            }
        }
        info!(
            "reconciled {} record(s): {} renamed, {} unmatched file(s)",
            summary.outcomes.len(),
            summary.committed(),
            summary.unmatched.len()
        );
        Ok(summary)
    }

    /// Every file currently under a root. Listing happens in the local view but entries are stored
    /// in the database view, so they compare equal to the paths computed from records.
    fn seed_unmatched(&self) -> Result<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();
        for root in self.roots {
            let local_root = self.options.local_view(root);
            debug!("listing {}", local_root.display());
            for relative in self.fs.list_files(&local_root)? {
                files.insert(root.join(relative));
            }
        }
        Ok(files)
    }

    fn reconcile_record(&mut self, record: MediaRecord, unmatched: &mut BTreeSet<PathBuf>) -> Result<RecordOutcome> {
        let Some(plan) = plan_rename(record, self.roots) else {
            return Ok(RecordOutcome::OutOfScope);
        };
        let old = plan.old_path.clone();
        let new = plan.new_path.clone();

        if !unmatched.remove(&old) {
            debug!("{} was not found while listing the roots", old.display());
        }

        let local_old = self.options.local_view(&old);
        let local_new = self.options.local_view(&new);

        if !self.options.local && !self.fs.exists(&local_old) {
            debug!("file doesn't exist: {}", old.display());
            return Ok(RecordOutcome::Missing { old });
        }
        if plan.is_canonical() {
            return Ok(RecordOutcome::AlreadyCanonical);
        }
        if self.fs.exists(&local_new) {
            writeln!(self.err, "New file exists: {} -> {}", old.display(), new.display())?;
            return Ok(RecordOutcome::Conflict { old, new });
        }

        if self.options.dry_run {
            writeln!(self.out, "{} -> {}", old.display(), new.display())?;
            return Ok(RecordOutcome::DryRun { old, new });
        }

        if let Err(e) = self.fs.rename(&local_old, &local_new) {
            writeln!(self.err, "Error renaming: {} -> {}", old.display(), new.display())?;
            debug!("rename of {} failed: {}", local_old.display(), e);
            return Ok(RecordOutcome::RenameFailed { old, new, error: e.to_string() });
        }

        if let Err(e) = self.update_database(&plan) {
            debug!("database update for movie {} failed: {}", plan.record.id, e);
            if let Err(undo) = self.fs.rename(&local_new, &local_old) {
                error!("failed to undo rename of {}: {}", local_new.display(), undo);
                return Err(RenamerError::Divergence { old, new });
            }
            writeln!(self.err, "Error updating database, undoing rename: {} -> {}", old.display(), new.display())?;
            return Ok(RecordOutcome::Reverted { old, new, error: e.to_string() });
        }

        writeln!(self.out, "{} -> {}", old.display(), new.display())?;
        Ok(RecordOutcome::Committed { old, new })
    }

    /// Both updates commit together or not at all; the transaction rolls back when dropped.
    fn update_database(&mut self, plan: &RenamePlan) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        database::update_movie_filename(&tx, &plan.record, &plan.new_filename, &plan.new_path)?;
        tx.commit()
    }
}
