//! Validation and persistence of code batches
//!
//! The repository sits between connection handlers and storage:
//!
//! ```text
//! ┌──────────────────────┐
//! │  Connection Handler  │
//! └──────────┬───────────┘
//!            │ batch of fragments
//!            ▼
//! ┌──────────────────────┐     record_code     ┌─────────────┐
//! │      Repository      │ ──────────────────▶ │   Monitor   │
//! └──────────┬───────────┘                     └─────────────┘
//!            │ first-seen codes only
//!            ▼
//! ┌──────────────────────┐
//! │     LineAppender     │
//! └──────────────────────┘
//! ```
//!
//! It holds no socket state and may be shared by any number of handlers.

use std::sync::Arc;

use crate::protocol::{self, Code, ProtocolError};

use super::log::LineAppender;
use super::monitor::Monitor;
use super::StorageError;

/// Outcome of saving one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveSummary {
    /// Codes seen for the first time and appended to the log
    pub persisted: usize,

    /// Codes that were already known and discarded
    pub duplicates: usize,
}

/// Validates batches and persists first-seen codes
pub struct Repository {
    monitor: Arc<Monitor>,
    log: Arc<dyn LineAppender>,
}

impl Repository {
    /// Create a repository over a shared monitor and log
    pub fn new(monitor: Arc<Monitor>, log: Arc<dyn LineAppender>) -> Self {
        Self { monitor, log }
    }

    /// Shared monitor
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Returns `true` if any element is not exactly nine ASCII digits
    ///
    /// An empty batch is valid.
    pub fn is_invalid<S: AsRef<str>>(&self, lines: &[S]) -> bool {
        self.validate(lines).is_err()
    }

    /// Parse every element of the batch, failing on the first bad one
    pub fn validate<S: AsRef<str>>(&self, lines: &[S]) -> Result<Vec<Code>, ProtocolError> {
        protocol::parse_batch(lines)
    }

    /// Record each code in order and append the first-seen ones to the log
    ///
    /// The log is flushed once per batch. On an append failure the rest of
    /// the batch is left unrecorded; the failing code itself stays marked as
    /// seen.
    pub async fn save(&self, codes: &[Code]) -> Result<SaveSummary, StorageError> {
        let mut summary = SaveSummary::default();

        for &code in codes {
            if self.monitor.record_code(code) {
                self.log.append_line(&code.to_string()).await?;
                summary.persisted += 1;
            } else {
                summary.duplicates += 1;
            }
        }

        if summary.persisted > 0 {
            self.log.flush().await?;
        }

        tracing::trace!(
            persisted = summary.persisted,
            duplicates = summary.duplicates,
            "Batch saved"
        );

        Ok(summary)
    }

    /// Flush the underlying log
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.log.flush().await
    }
}
