//! Deduplication bookkeeping and code persistence
//!
//! - [`Monitor`] - seen-code set and per-interval counters
//! - [`Repository`] - batch validation and first-seen persistence
//! - [`LineAppender`] - append-only log seam, with file and memory backends

pub mod log;
pub mod monitor;
pub mod repository;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use log::{FileLineLog, LineAppender, MemoryLineLog};
pub use monitor::{Monitor, Report};
pub use repository::{Repository, SaveSummary};

/// Errors raised while writing the code log
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O failure on the log file
    #[error("Log I/O error during '{operation}' on {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Wrap an I/O error with the failing operation and path
    pub fn io(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}
