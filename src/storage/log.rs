//! Append-only code log
//!
//! [`LineAppender`] is the seam between the repository and the physical
//! write. The file implementation holds its writer behind an async mutex so
//! every line goes out whole; concurrent batches may interleave between
//! lines but never inside one.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use super::StorageError;

/// Capability to append single lines to a persistent log
#[async_trait]
pub trait LineAppender: Send + Sync {
    /// Append one line; the terminator is added by the implementation
    async fn append_line(&self, line: &str) -> Result<(), StorageError>;

    /// Push buffered lines to the underlying storage
    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

// ============================================================================
// File Implementation
// ============================================================================

/// Line log backed by a file that is recreated when the log is opened
pub struct FileLineLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileLineLog {
    /// Truncate (or create) the file at `path` and open it for appending
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io("create log directory", &path, e))?;
        }

        let file = File::create(&path)
            .await
            .map_err(|e| StorageError::io("create log", &path, e))?;

        tracing::info!(path = %path.display(), "Code log truncated");

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LineAppender for FileLineLog {
    async fn append_line(&self, line: &str) -> Result<(), StorageError> {
        let mut writer = self.writer.lock().await;
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        writer
            .write_all(record.as_bytes())
            .await
            .map_err(|e| StorageError::io("append", &self.path, e))
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.writer
            .lock()
            .await
            .flush()
            .await
            .map_err(|e| StorageError::io("flush", &self.path, e))
    }
}

// ============================================================================
// Memory Implementation
// ============================================================================

/// In-memory line log
#[derive(Debug, Default)]
pub struct MemoryLineLog {
    lines: StdMutex<Vec<String>>,
}

impl MemoryLineLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines appended so far, in append order
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LineAppender for MemoryLineLog {
    async fn append_line(&self, line: &str) -> Result<(), StorageError> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }
}
