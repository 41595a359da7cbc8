//! Per-connection line protocol handler
//!
//! State machine per session:
//!
//! ```text
//! READING ── valid batch ────────────────────▶ READING
//! READING ── terminate ──────────────────────▶ CLOSED (shutdown triggered)
//! READING ── invalid line ───────────────────▶ CLOSED
//! READING ── end of stream / shutdown / error ▶ CLOSED
//! ```
//!
//! Nothing is ever written back to the client.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, info};

use crate::error::NumlogErrorTrait;
use crate::protocol::{ProtocolError, Request};
use crate::storage::Repository;

use super::shutdown::{ShutdownHandle, ShutdownReason};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client closed the stream
    PeerClosed,
    /// The client sent the terminate line
    Terminated,
    /// The client sent something other than codes or terminate
    ProtocolViolation,
    /// Server shutdown was observed
    Shutdown,
    /// Persisting a batch failed
    StorageFailed,
    /// Reading from the socket failed
    IoError,
}

/// Reads lines from one client and forwards valid batches
#[derive(Clone)]
pub struct ConnectionHandler {
    repository: Arc<Repository>,
    shutdown: ShutdownHandle,
    max_line_length: usize,
}

impl ConnectionHandler {
    pub fn new(repository: Arc<Repository>, shutdown: ShutdownHandle, max_line_length: usize) -> Self {
        Self {
            repository,
            shutdown,
            max_line_length,
        }
    }

    /// Serve one client until it disconnects, misbehaves, or shutdown starts
    ///
    /// The stream is dropped, and the socket closed, on return.
    pub async fn handle<S>(&self, stream: S, peer: SocketAddr) -> SessionOutcome
    where
        S: AsyncRead + Unpin,
    {
        let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(self.max_line_length));

        let outcome = loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break SessionOutcome::Shutdown,
                frame = lines.next() => frame,
            };

            let line = match frame {
                None => break SessionOutcome::PeerClosed,
                Some(Ok(line)) => line,
                Some(Err(e)) => break self.classify_read_error(e, peer),
            };

            // A line that raced with shutdown is dropped unprocessed
            if self.shutdown.is_triggered() {
                break SessionOutcome::Shutdown;
            }

            match self.process_line(&line, peer).await {
                Some(outcome) => break outcome,
                None => continue,
            }
        };

        debug!(%peer, ?outcome, "Connection closed");
        outcome
    }

    /// Handle one line; `Some` ends the session
    async fn process_line(&self, line: &str, peer: SocketAddr) -> Option<SessionOutcome> {
        let fragments = match Request::classify(line) {
            Request::Terminate => {
                info!(%peer, "Terminate command received");
                self.shutdown.trigger(ShutdownReason::TerminateCommand);
                return Some(SessionOutcome::Terminated);
            }
            Request::Batch(fragments) => fragments,
        };

        let codes = match self.repository.validate(&fragments) {
            Ok(codes) => codes,
            Err(e) => {
                debug!(%peer, error = %e, "Protocol violation, dropping connection");
                return Some(SessionOutcome::ProtocolViolation);
            }
        };

        if codes.is_empty() {
            return None;
        }

        match self.repository.save(&codes).await {
            Ok(_) => None,
            Err(e) => {
                error!(
                    %peer,
                    error = %e,
                    category = ?e.category(),
                    recoverable = e.is_recoverable(),
                    "Failed to persist codes"
                );
                Some(SessionOutcome::StorageFailed)
            }
        }
    }

    fn classify_read_error(&self, err: LinesCodecError, peer: SocketAddr) -> SessionOutcome {
        let protocol_error = match err {
            LinesCodecError::MaxLineLengthExceeded => ProtocolError::LineTooLong(self.max_line_length),
            LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                ProtocolError::InvalidEncoding
            }
            LinesCodecError::Io(e) => {
                debug!(%peer, error = %e, "Client read failed");
                return SessionOutcome::IoError;
            }
        };

        debug!(%peer, error = %protocol_error, "Protocol violation, dropping connection");
        SessionOutcome::ProtocolViolation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryLineLog, Monitor};
    use tokio::io::AsyncWriteExt;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn handler() -> (ConnectionHandler, Arc<MemoryLineLog>, ShutdownHandle) {
        let log = Arc::new(MemoryLineLog::new());
        let repository = Arc::new(Repository::new(Arc::new(Monitor::new()), log.clone()));
        let shutdown = ShutdownHandle::new();
        (ConnectionHandler::new(repository, shutdown.clone(), 64), log, shutdown)
    }

    async fn run_with_input(handler: &ConnectionHandler, input: &[u8]) -> SessionOutcome {
        let (mut client, server) = tokio::io::duplex(4096);
        client.write_all(input).await.unwrap();
        drop(client);
        handler.handle(server, peer()).await
    }

    #[tokio::test]
    async fn test_valid_lines_until_peer_closes() {
        let (handler, log, shutdown) = handler();

        let outcome = run_with_input(&handler, b"123456789\n000000001\n000000001\n987654321\n").await;

        assert_eq!(outcome, SessionOutcome::PeerClosed);
        assert_eq!(log.lines(), vec!["123456789", "000000001", "987654321"]);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_crlf_and_embedded_carriage_returns() {
        let (handler, log, _) = handler();

        let outcome = run_with_input(&handler, b"123456789\r\n111111111\r222222222\r\n\n").await;

        assert_eq!(outcome, SessionOutcome::PeerClosed);
        assert_eq!(log.lines(), vec!["123456789", "111111111", "222222222"]);
    }

    #[tokio::test]
    async fn test_invalid_line_closes_without_saving_it() {
        let (handler, log, _) = handler();

        let outcome = run_with_input(&handler, b"123456789\ninvalid\n000000002\n").await;

        assert_eq!(outcome, SessionOutcome::ProtocolViolation);
        assert_eq!(log.lines(), vec!["123456789"]);
    }

    #[tokio::test]
    async fn test_invalid_batch_is_all_or_nothing() {
        let (handler, log, _) = handler();

        let outcome = run_with_input(&handler, b"123456789\r12345678\n").await;

        assert_eq!(outcome, SessionOutcome::ProtocolViolation);
        assert!(log.lines().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_triggers_shutdown() {
        let (handler, log, shutdown) = handler();

        let outcome = run_with_input(&handler, b"123456789\nterminate\n000000002\n").await;

        assert_eq!(outcome, SessionOutcome::Terminated);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::TerminateCommand));
        assert_eq!(log.lines(), vec!["123456789"]);
    }

    #[tokio::test]
    async fn test_overlong_line_is_violation() {
        let (handler, log, _) = handler();
        let mut input = vec![b'1'; 200];
        input.push(b'\n');

        let outcome = run_with_input(&handler, &input).await;

        assert_eq!(outcome, SessionOutcome::ProtocolViolation);
        assert!(log.lines().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_is_violation() {
        let (handler, _, _) = handler();

        let outcome = run_with_input(&handler, b"\xff\xfe12345678\n").await;

        assert_eq!(outcome, SessionOutcome::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_idle_read() {
        let (handler, _, shutdown) = handler();
        let (_client, server) = tokio::io::duplex(64);

        let task = tokio::spawn(async move { handler.handle(server, peer()).await });
        tokio::task::yield_now().await;
        shutdown.trigger(ShutdownReason::Requested);

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("handler should stop promptly")
            .unwrap();
        assert_eq!(outcome, SessionOutcome::Shutdown);
    }

    #[tokio::test]
    async fn test_lines_after_shutdown_are_ignored() {
        let (handler, log, shutdown) = handler();
        shutdown.trigger(ShutdownReason::Requested);

        let outcome = run_with_input(&handler, b"123456789\n").await;

        assert_eq!(outcome, SessionOutcome::Shutdown);
        assert!(log.lines().is_empty());
    }

    struct FailingLog;

    #[async_trait::async_trait]
    impl crate::storage::LineAppender for FailingLog {
        async fn append_line(&self, _line: &str) -> Result<(), crate::storage::StorageError> {
            Err(crate::storage::StorageError::io(
                "append",
                std::path::Path::new("numbers.log"),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_ends_session_only() {
        let monitor = Arc::new(Monitor::new());
        let repository = Arc::new(Repository::new(monitor.clone(), Arc::new(FailingLog)));
        let shutdown = ShutdownHandle::new();
        let handler = ConnectionHandler::new(repository, shutdown.clone(), 64);

        let outcome = run_with_input(&handler, b"123456789\n000000002\n").await;

        assert_eq!(outcome, SessionOutcome::StorageFailed);
        assert!(monitor.contains(crate::protocol::Code::parse("123456789").unwrap()));
        assert!(!monitor.contains(crate::protocol::Code::parse("000000002").unwrap()));
        assert!(!shutdown.is_triggered());
    }
}
