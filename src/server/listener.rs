//! Listener, admission control and shutdown sequencing
//!
//! The accept loop takes an admission permit *before* calling `accept()`,
//! so once `max_connections` sessions are active further clients wait in
//! the kernel backlog instead of being read from. Each accepted socket runs
//! on its own task holding the permit; dropping the permit frees the slot.
//!
//! Shutdown order:
//! 1. the shutdown flag is set and the token cancelled (idempotent)
//! 2. the accept loop exits and the listener is dropped
//! 3. the report scheduler stops
//! 4. sessions get `shutdown_grace` to observe the flag, then are aborted
//! 5. the log is flushed and admission capacity released

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::scheduler::{ReportScheduler, ReportSink, StdoutReportSink};
use crate::storage::{FileLineLog, LineAppender, Monitor, Repository, StorageError};

use super::connection::{ConnectionHandler, SessionOutcome};
use super::shutdown::{ShutdownHandle, ShutdownReason, ShutdownStats};

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Failed to bind the listening socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Failed to inspect the listening socket
    #[error("Listener error: {0}")]
    Listener(#[source] std::io::Error),

    /// Code log could not be prepared
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ============================================================================
// Number Server
// ============================================================================

/// Bound TCP server ready to run
pub struct NumberServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    monitor: Arc<Monitor>,
    repository: Arc<Repository>,
    sink: Arc<dyn ReportSink>,
    shutdown: ShutdownHandle,
    admission: Arc<Semaphore>,
    max_line_length: usize,
    report_interval: Duration,
    shutdown_grace: Duration,
}

impl NumberServer {
    /// Truncate the configured log file, bind, and report to stdout
    pub async fn start(config: &Config) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.into()))?;

        let log = Arc::new(FileLineLog::create(&config.storage.log_path).await?);
        Self::bind(config, log, Arc::new(StdoutReportSink)).await
    }

    /// Bind the listener with injected log and report sink
    ///
    /// The log must already be truncated; no client is accepted before
    /// this returns.
    pub async fn bind(
        config: &Config,
        log: Arc<dyn LineAppender>,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.into()))?;

        let addr = config.server.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::Listener)?;

        let monitor = Arc::new(Monitor::new());
        let repository = Arc::new(Repository::new(monitor.clone(), log));

        Ok(Self {
            listener,
            local_addr,
            monitor,
            repository,
            sink,
            shutdown: ShutdownHandle::new(),
            admission: Arc::new(Semaphore::new(config.server.max_connections)),
            max_line_length: config.server.max_line_length,
            report_interval: config.report_interval(),
            shutdown_grace: config.shutdown_grace(),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared dedup monitor
    pub fn monitor(&self) -> Arc<Monitor> {
        self.monitor.clone()
    }

    /// Handle for requesting shutdown from outside the server
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve clients until shutdown, then stop everything
    pub async fn run(self) -> ShutdownStats {
        info!(
            addr = %self.local_addr,
            max_connections = self.admission.available_permits(),
            "Listening for clients"
        );

        let scheduler = ReportScheduler::new(self.monitor.clone(), self.sink.clone(), self.report_interval)
            .spawn(self.shutdown.token());

        let handler = ConnectionHandler::new(
            self.repository.clone(),
            self.shutdown.clone(),
            self.max_line_length,
        );
        let mut sessions = JoinSet::new();
        let mut stats = ShutdownStats::default();

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(result) = sessions.join_next() => {
                    log_session_end(result);
                    continue;
                }
                permit = self.admission.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            if self.shutdown.is_triggered() {
                debug!(%peer, "Rejecting connection accepted during shutdown");
                stats.rejected += 1;
                drop(stream);
                continue;
            }

            debug!(%peer, "Client connected");
            sessions.spawn(serve(handler.clone(), stream, peer, permit));
        }

        let stopping = Instant::now();
        drop(self.listener);

        if let Err(e) = scheduler.await {
            warn!(error = %e, "Report scheduler ended abnormally");
        }

        let (drained, force_closed) = drain_sessions(&mut sessions, self.shutdown_grace).await;
        stats.drained = drained;
        stats.force_closed = force_closed;

        if let Err(e) = self.repository.flush().await {
            warn!(error = %e, "Failed to flush code log during shutdown");
        }
        self.admission.close();

        stats.reason = self.shutdown.reason();
        stats.duration = stopping.elapsed();
        info!(
            reason = ?stats.reason,
            drained = stats.drained,
            force_closed = stats.force_closed,
            rejected = stats.rejected,
            elapsed_ms = stats.duration.as_millis() as u64,
            "Server stopped"
        );
        stats
    }

    /// Request shutdown as an external stop
    pub fn shutdown(&self) -> bool {
        self.shutdown.trigger(ShutdownReason::Requested)
    }
}

async fn serve(
    handler: ConnectionHandler,
    stream: TcpStream,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
) -> SessionOutcome {
    handler.handle(stream, peer).await
}

fn log_session_end(result: Result<SessionOutcome, tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!(error = %e, "Connection task panicked");
        }
    }
}

/// Wait up to `grace` for sessions to finish, then abort the rest
async fn drain_sessions(sessions: &mut JoinSet<SessionOutcome>, grace: Duration) -> (usize, usize) {
    let mut drained = 0;

    let finished = tokio::time::timeout(grace, async {
        while let Some(result) = sessions.join_next().await {
            log_session_end(result);
            drained += 1;
        }
    })
    .await;

    if finished.is_ok() {
        return (drained, 0);
    }

    let force_closed = sessions.len();
    warn!(force_closed, "Grace period elapsed, closing remaining connections");
    sessions.abort_all();
    while sessions.join_next().await.is_some() {}

    (drained, force_closed)
}
