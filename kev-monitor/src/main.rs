//! kev-monitor: prints keyspace notifications from a RESP2 store
//!
//! Subscribes to a notification pattern on its own connection, looks up each
//! key's current value over a second connection, and writes one line per
//! event to stdout until interrupted.

mod config;
mod sink;

use std::sync::Arc;

use anyhow::Context;
use kev_client::{CommandConnection, NotificationPipeline, PipelineConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use sink::ConsoleSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        endpoint = %config.endpoint,
        pattern = %config.pattern,
        lookup_values = config.lookup_values,
        format = ?config.format,
        "Starting kev-monitor"
    );

    let lookup = if config.lookup_values {
        let conn = CommandConnection::with_config(&config.endpoint, &config.connection)
            .with_context(|| format!("opening lookup connection to {}", config.endpoint))?;
        Some(Arc::new(conn))
    } else {
        None
    };

    let mut pipeline = NotificationPipeline::new(config.endpoint.clone(), ConsoleSink::stdout(config.format))
        .with_config(PipelineConfig {
            pattern: config.pattern.clone(),
            connection: config.connection.clone(),
        });
    if let Some(conn) = &lookup {
        pipeline = pipeline.with_lookup(conn.clone());
    }

    let handle = pipeline.spawn().context("spawning pipeline thread")?;
    let cancel = handle.cancel_token();
    let mut finished = tokio::task::spawn_blocking(move || handle.join());

    let outcome = tokio::select! {
        outcome = &mut finished => outcome?,
        signal = shutdown_signal() => {
            signal.context("listening for shutdown signal")?;
            info!("Shutdown signal received");
            cancel.cancel();
            finished.await?
        }
    };

    if let Some(conn) = lookup {
        conn.close();
    }

    match outcome {
        Ok(stats) => {
            info!(
                messages = stats.messages_received,
                delivered = stats.events_delivered,
                malformed = stats.malformed_messages,
                lookup_failures = stats.lookup_failures,
                sink_failures = stats.sink_failures,
                "kev-monitor stopped"
            );
            Ok(())
        }
        Err(err) => {
            warn!(recoverable = err.is_recoverable(), "subscription ended");
            Err(err).context("notification stream failed")
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
