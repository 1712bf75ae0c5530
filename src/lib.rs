pub mod canonical;
pub mod common;
pub mod config;
pub mod database;
pub mod error;
pub mod reconcile;
pub mod sources;

pub use database::MediaRecord;
pub use error::{RenamerError, RenamerExpectedError, Result};
pub use reconcile::{FileSystem, LocalFileSystem, ReconcileOptions, ReconcileSummary, Reconciler, RecordOutcome};

#[cfg(test)]
mod testing;
