//! Periodic interval report
//!
//! The scheduler wakes once per interval, asks the [`Monitor`] for the
//! interval snapshot and hands the formatted line to a [`ReportSink`]. The
//! first report fires one full interval after the scheduler starts.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::storage::Monitor;

// ============================================================================
// Report Sinks
// ============================================================================

/// Destination for report lines
pub trait ReportSink: Send + Sync {
    /// Emit one report line
    fn emit(&self, report: &str);
}

/// Writes each report as a line on standard output
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReportSink;

impl ReportSink for StdoutReportSink {
    fn emit(&self, report: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{report}").and_then(|()| stdout.flush()) {
            tracing::warn!(error = %e, "Failed to write report to stdout");
        }
    }
}

/// Keeps reports in memory
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    reports: Mutex<Vec<String>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports emitted so far
    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportSink for MemoryReportSink {
    fn emit(&self, report: &str) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.to_string());
    }
}

// ============================================================================
// Report Scheduler
// ============================================================================

/// Drives `Monitor::flush_report` at a fixed rate
pub struct ReportScheduler {
    monitor: Arc<Monitor>,
    sink: Arc<dyn ReportSink>,
    interval: Duration,
}

impl ReportScheduler {
    /// Create a scheduler; `interval` must be non-zero
    pub fn new(monitor: Arc<Monitor>, sink: Arc<dyn ReportSink>, interval: Duration) -> Self {
        Self {
            monitor,
            sink,
            interval,
        }
    }

    /// Report interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the report loop on its own task until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    /// Report loop
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(interval_secs = self.interval.as_secs_f64(), "Report scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.monitor.flush_report();
                    self.sink.emit(&report);
                }
            }
        }

        tracing::debug!("Report scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Code;

    fn scheduler(monitor: Arc<Monitor>) -> (ReportScheduler, Arc<MemoryReportSink>) {
        let sink = Arc::new(MemoryReportSink::new());
        let scheduler = ReportScheduler::new(monitor, sink.clone(), Duration::from_secs(10));
        (scheduler, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_report_after_one_interval() {
        let monitor = Arc::new(Monitor::new());
        monitor.record_code(Code::parse("123456789").unwrap());
        let (scheduler, sink) = scheduler(monitor);
        let token = CancellationToken::new();
        let handle = scheduler.spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(sink.reports().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            sink.reports(),
            vec!["Received 1 unique numbers, 0 duplicates. Unique total: 1"]
        );

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_repeat_with_deltas() {
        let monitor = Arc::new(Monitor::new());
        let (scheduler, sink) = scheduler(monitor.clone());
        let token = CancellationToken::new();
        let handle = scheduler.spawn(token.clone());

        monitor.record_code(Code::parse("000000001").unwrap());
        tokio::time::sleep(Duration::from_secs(11)).await;

        monitor.record_code(Code::parse("000000001").unwrap());
        monitor.record_code(Code::parse("000000002").unwrap());
        tokio::time::sleep(Duration::from_secs(10)).await;

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(
            sink.reports(),
            vec![
                "Received 1 unique numbers, 0 duplicates. Unique total: 1",
                "Received 1 unique numbers, 1 duplicates. Unique total: 2",
                "Received 0 unique numbers, 0 duplicates. Unique total: 2",
            ]
        );

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_reports() {
        let monitor = Arc::new(Monitor::new());
        let (scheduler, sink) = scheduler(monitor);
        let token = CancellationToken::new();
        let handle = scheduler.spawn(token.clone());

        token.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(sink.reports().is_empty());
    }
}
