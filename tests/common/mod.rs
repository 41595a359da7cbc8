//! Common test utilities

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use numlog::config::Config;
use numlog::scheduler::MemoryReportSink;
use numlog::server::{NumberServer, ShutdownHandle, ShutdownStats};
use numlog::storage::{LineAppender, MemoryLineLog, Monitor};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Config bound to an ephemeral loopback port with a short grace period
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.bind_address = SocketAddr::from(([127, 0, 0, 1], 0));
    config.server.shutdown_grace_secs = 1;
    config.report.interval_secs = 3600;
    config
}

/// A server running on a background task
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub monitor: Arc<Monitor>,
    pub sink: Arc<MemoryReportSink>,
    pub shutdown: ShutdownHandle,
    pub task: JoinHandle<ShutdownStats>,
}

#[allow(dead_code)]
impl TestServer {
    /// Wait for `run` to return
    pub async fn stopped(self) -> ShutdownStats {
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

/// Start a server writing to an in-memory log
#[allow(dead_code)]
pub async fn spawn_memory_server(config: Config) -> (TestServer, Arc<MemoryLineLog>) {
    let log = Arc::new(MemoryLineLog::new());
    let server = spawn_server(config, log.clone()).await;
    (server, log)
}

/// Start a server with the given log backend
pub async fn spawn_server(config: Config, log: Arc<dyn LineAppender>) -> TestServer {
    let sink = Arc::new(MemoryReportSink::new());
    let server = NumberServer::bind(&config, log, sink.clone())
        .await
        .expect("failed to bind test server");

    let addr = server.local_addr();
    let monitor = server.monitor();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());

    TestServer {
        addr,
        monitor,
        sink,
        shutdown,
        task,
    }
}

/// Connect a client
pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("failed to connect")
}

/// Write each line followed by a newline
#[allow(dead_code)]
pub async fn send_lines(stream: &mut TcpStream, lines: &[&str]) {
    for line in lines {
        stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("failed to write");
    }
    stream.flush().await.expect("failed to flush");
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
