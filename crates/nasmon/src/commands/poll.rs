//! `nasmon poll <collector>`: one fetch → parse for each selected server.
//!
//! Unlike the runner, a failed fetch here is the command's result.

use std::time::SystemTime;

use tracing::debug;

use nasmon_api::SessionStore;
use nasmon_core::{HostContext, SourceIdentity};

use crate::cli::{GlobalOpts, PollArgs};
use crate::commands;
use crate::error::CliError;
use crate::output::Sink;

pub async fn handle(args: &PollArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (cfg, hosts) = commands::load_hosts(global)?;
    let sessions = SessionStore::new();
    let sink = Sink::new(cfg.publisher.format, cfg.publisher.base_topic.clone());

    let result = poll_all(args, hosts, &sessions, &sink).await;
    sessions.close_all().await;
    result
}

async fn poll_all(
    args: &PollArgs,
    hosts: Vec<nasmon_core::HostConfig>,
    sessions: &SessionStore,
    sink: &Sink,
) -> Result<(), CliError> {
    for host in hosts {
        let ctx = HostContext::new(host, sessions)?;
        let collector = ctx.collector(&args.collector).map_err(|e| CliError::CollectorUnavailable {
            name: args.collector.clone(),
            reason: e.to_string(),
        })?;

        debug!(host = ctx.name(), collector = collector.name(), "polling once");
        let raw = collector.fetch().await?;
        if args.raw {
            println!("{}", serde_json::to_string_pretty(&raw)?);
            continue;
        }

        let source = SourceIdentity::new(ctx.name(), collector.name());
        sink.write_updates(&source, &collector.parse(&raw), SystemTime::now())?;
    }
    Ok(())
}
