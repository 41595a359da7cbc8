//! numlog - deduplicating TCP code log
//!
//! A line-protocol server that accepts nine-digit codes from a bounded number
//! of concurrent clients, writes every first-seen code to an append-only log,
//! and prints a periodic report of new unique and duplicate submissions.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`protocol`] - Code parsing and line classification
//! - [`storage`] - Dedup monitor, repository and code log
//! - [`scheduler`] - Periodic interval report
//! - [`server`] - Listener, admission control, connection handling, shutdown
//! - [`error`] - Unified error types
//!
//! # Example
//!
//! ```no_run
//! use numlog::config::Config;
//! use numlog::server::NumberServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = NumberServer::start(&config).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, NumlogErrorTrait, Result};
    pub use crate::protocol::Code;
    pub use crate::server::{NumberServer, ShutdownHandle, ShutdownReason, ShutdownStats};
    pub use crate::storage::{LineAppender, Monitor, Repository};
}

// Direct re-exports for convenience
pub use protocol::Code;
pub use storage::{Monitor, Report};
