//! `nasmon run`: every collector of every selected server until a signal.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use nasmon_api::SessionStore;
use nasmon_core::{ChannelPublisher, HostContext, Runner};

use crate::cli::GlobalOpts;
use crate::commands;
use crate::error::CliError;
use crate::output::Sink;

/// Batches buffered between the collectors and the writer.
const CHANNEL_CAPACITY: usize = 256;

/// How long the writer gets to drain after the runner has stopped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let (cfg, hosts) = commands::load_hosts(global)?;
    let sessions = SessionStore::new();
    let (publisher, mut batches) = ChannelPublisher::new(CHANNEL_CAPACITY);
    let mut runner = Runner::new(Arc::new(publisher));

    for host in hosts {
        let ctx = HostContext::new(host, &sessions)?;
        let started = runner.spawn_host(&ctx);
        if started == 0 {
            warn!(host = ctx.name(), "no collectors enabled for host");
        }
    }
    if runner.is_empty() {
        return Err(CliError::Validation {
            field: "servers".into(),
            reason: "no collector could be started on any server".into(),
        });
    }
    info!(collectors = runner.len(), "collectors running");

    let sink = Sink::new(cfg.publisher.format, cfg.publisher.base_topic.clone());
    let writer = tokio::spawn(async move {
        while let Some(batch) = batches.recv().await {
            if let Err(e) = sink.write_batch(&batch) {
                error!(source = %batch.source, error = %e, "failed to write batch");
            }
        }
    });

    shutdown_signal().await?;
    info!("shutdown requested");

    let aborted = runner.shutdown(cfg.shutdown_grace()).await;
    if aborted > 0 {
        warn!(aborted, "some collectors were aborted");
    }
    // The writer ends once the last publisher handle is dropped.
    if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("output writer did not drain in time");
    }
    sessions.close_all().await;
    info!("stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<(), CliError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<(), CliError> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
