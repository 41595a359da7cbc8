//! Server-wide shutdown coordination
//!
//! [`ShutdownHandle`] pairs a write-once flag with a [`CancellationToken`].
//! The flag answers "has shutdown started?" without awaiting, the token
//! interrupts tasks blocked on accept, read, or the report timer.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why shutdown was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownReason {
    /// A client sent the terminate line
    TerminateCommand = 1,
    /// The process received Ctrl-C or SIGTERM
    Signal = 2,
    /// Requested programmatically
    Requested = 3,
}

impl ShutdownReason {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::TerminateCommand),
            2 => Some(Self::Signal),
            3 => Some(Self::Requested),
            _ => None,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminateCommand => write!(f, "terminate command"),
            Self::Signal => write!(f, "signal"),
            Self::Requested => write!(f, "requested"),
        }
    }
}

/// Cloneable trigger and observer for server shutdown
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    // 0 while running, otherwise the ShutdownReason discriminant
    reason: Arc<AtomicU8>,
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start shutdown; only the first call has any effect
    ///
    /// Returns `true` for the call that flipped the flag.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let won = self
            .reason
            .compare_exchange(0, reason as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            tracing::info!(%reason, "Shutdown initiated");
            self.token.cancel();
        }
        won
    }

    /// Whether shutdown has started
    pub fn is_triggered(&self) -> bool {
        self.reason.load(Ordering::Acquire) != 0
    }

    /// Reason given by the first trigger, if any
    pub fn reason(&self) -> Option<ShutdownReason> {
        ShutdownReason::from_u8(self.reason.load(Ordering::Acquire))
    }

    /// Resolves once shutdown has been triggered
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Token for tasks that only need cancellation
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("reason", &self.reason())
            .finish()
    }
}

/// Statistics collected while the server stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownStats {
    /// Reason shutdown started
    pub reason: Option<ShutdownReason>,
    /// Connections that finished on their own within the grace period
    pub drained: usize,
    /// Connections aborted after the grace period
    pub force_closed: usize,
    /// Connections accepted after shutdown began and closed unread
    pub rejected: usize,
    /// Time from the end of the accept loop to full stop
    pub duration: Duration,
}
