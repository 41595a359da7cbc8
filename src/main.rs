use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use numlog::config::Config;
use numlog::error::{Error, NumlogErrorTrait};
use numlog::server::{NumberServer, ShutdownReason};

#[derive(Parser)]
#[command(
    name = "numlog",
    version,
    about = "Deduplicating TCP log for nine-digit codes",
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "NUMLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configured bind address port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Code log file, truncated at startup
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    setup_tracing(&config.logging.level, &config.logging.format, cli.verbose)?;

    tracing::info!(
        addr = %config.server.bind_address,
        log_path = %config.storage.log_path.display(),
        max_connections = config.server.max_connections,
        report_interval_secs = config.report.interval_secs,
        "numlog starting"
    );

    let server = match NumberServer::start(&config).await {
        Ok(server) => server,
        Err(e) => {
            let err = Error::from(e);
            tracing::error!(
                error = %err,
                category = ?err.category(),
                "Failed to start server"
            );
            return Err(err).context("Failed to start server");
        }
    };

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!("Shutdown signal received");
                handle.trigger(ShutdownReason::Signal);
            }
            _ = handle.cancelled() => {}
        }
    });

    let stats = server.run().await;
    tracing::info!(
        reason = ?stats.reason,
        drained = stats.drained,
        force_closed = stats.force_closed,
        "numlog exiting"
    );

    Ok(())
}

/// File (or defaults), then environment, then command-line flags
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(port) = cli.port {
        config.server.bind_address.set_port(port);
    }
    if let Some(path) = &cli.log_path {
        config.storage.log_path = path.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

fn setup_tracing(level: &str, format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("numlog=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("numlog={level},warn"))
            .context("Invalid log level")?
    };

    // stdout carries the interval report only
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
