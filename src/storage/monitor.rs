//! In-memory deduplication and interval counters
//!
//! The [`Monitor`] is the single arbiter of "first seen". It owns the set of
//! every code accepted during this run together with the unique/duplicate
//! counters for the current report interval. Both operations take the same
//! lock, so a code recorded concurrently with a flush lands in exactly one
//! interval.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::protocol::Code;

// ============================================================================
// Report
// ============================================================================

/// Snapshot taken at the end of a report interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Report {
    /// New unique codes since the previous report
    pub unique: u64,

    /// Duplicate submissions since the previous report
    pub duplicates: u64,

    /// Unique codes seen during the whole run
    pub unique_total: u64,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} unique numbers, {} duplicates. Unique total: {}",
            self.unique, self.duplicates, self.unique_total
        )
    }
}

// ============================================================================
// Monitor
// ============================================================================

#[derive(Debug, Default)]
struct MonitorState {
    seen: HashSet<u32>,
    interval_unique: u64,
    interval_duplicates: u64,
}

/// Shared bookkeeping for seen codes and per-interval counters
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
}

impl Monitor {
    /// Create an empty monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a code, returning `true` if it had not been seen before
    ///
    /// A `true` result obliges the caller to persist the code. Two callers
    /// racing on the same new code never both get `true`.
    pub fn record_code(&self, code: Code) -> bool {
        let mut state = self.lock();
        if state.seen.insert(code.value()) {
            state.interval_unique += 1;
            true
        } else {
            state.interval_duplicates += 1;
            false
        }
    }

    /// Take the interval snapshot and reset the interval counters
    pub fn take_report(&self) -> Report {
        let mut state = self.lock();
        let report = Report {
            unique: state.interval_unique,
            duplicates: state.interval_duplicates,
            unique_total: state.seen.len() as u64,
        };
        state.interval_unique = 0;
        state.interval_duplicates = 0;
        report
    }

    /// Format the interval report line and reset the interval counters
    pub fn flush_report(&self) -> String {
        self.take_report().to_string()
    }

    /// Unique codes seen during the whole run
    pub fn unique_total(&self) -> u64 {
        self.lock().seen.len() as u64
    }

    /// Whether a code has already been recorded
    pub fn contains(&self, code: Code) -> bool {
        self.lock().seen.contains(&code.value())
    }

    // Counters stay consistent even if a holder panicked: every mutation
    // is a single insert plus one increment.
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
