//! Timed background work
//!
//! Currently a single job: the interval report that prints unique and
//! duplicate deltas plus the running unique total.

pub mod report;

pub use report::{MemoryReportSink, ReportScheduler, ReportSink, StdoutReportSink};
