//! Clap derive structures for the `nasmon` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nasmon -- NAS state collector
#[derive(Debug, Parser)]
#[command(
    name = "nasmon",
    version,
    about = "Poll NAS hosts and publish their state as home-automation entities",
    long_about = "Polls each configured host through its structured query API and its\n\
        cookie-authenticated web endpoints, and publishes one record per entity.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "NASMON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Only use this server from the config
    #[arg(long, short = 's', env = "NASMON_SERVER", global = true)]
    pub server: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format (logs go to stderr)
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every collector of every server until interrupted
    Run,

    /// List the known collectors
    #[command(alias = "ls")]
    Collectors,

    /// Run one collector once and print its entities
    Poll(PollArgs),

    /// Inspect the configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct PollArgs {
    /// Collector name (see `nasmon collectors`)
    pub collector: String,

    /// Print the raw fetched payload instead of entities
    #[arg(long)]
    pub raw: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Print the effective configuration, secrets redacted
    Show,
}
