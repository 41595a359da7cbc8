//! TCP server for code submission
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 NumberServer                 │
//! │                                              │
//! │  accept loop ── admission semaphore (5) ──┐  │
//! │                                           ▼  │
//! │            ConnectionHandler × N ≤ 5         │
//! │                      │                       │
//! │                      ▼                       │
//! │        Repository ──▶ Monitor                │
//! │            │                                 │
//! │            ▼                                 │
//! │       LineAppender (numbers.log)             │
//! │                                              │
//! │  ReportScheduler ── every interval ──▶ sink  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use numlog::config::Config;
//! use numlog::server::NumberServer;
//!
//! # async fn example() -> Result<(), numlog::server::ServerError> {
//! let server = NumberServer::start(&Config::default()).await?;
//! let stats = server.run().await;
//! println!("drained {} connections", stats.drained);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod listener;
pub mod shutdown;

pub use connection::{ConnectionHandler, SessionOutcome};
pub use listener::{NumberServer, ServerError};
pub use shutdown::{ShutdownHandle, ShutdownReason, ShutdownStats};
