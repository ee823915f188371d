//! Command handlers and the config plumbing they share.

pub mod collectors;
pub mod config_cmd;
pub mod poll;
pub mod run;

use std::path::PathBuf;

use nasmon_config::{self as config, Config, ConfigError};
use nasmon_core::HostConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// `--config` / `NASMON_CONFIG`, else the platform default.
pub fn resolve_config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Load the config, tolerating a missing file and an empty server list.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = resolve_config_path(global);
    Ok(config::load_config(&path)?)
}

/// Load and validate the config, then resolve the selected servers.
pub fn load_hosts(global: &GlobalOpts) -> Result<(Config, Vec<HostConfig>), CliError> {
    let cfg = load(global)?;
    if cfg.servers.is_empty() {
        return Err(CliError::NoServers {
            path: resolve_config_path(global).display().to_string(),
        });
    }
    cfg.validate()?;

    let hosts = config::host_configs(&cfg, global.server.as_deref()).map_err(|e| match e {
        ConfigError::UnknownServer { name } => CliError::UnknownServer {
            name,
            available: cfg
                .servers
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        },
        other => other.into(),
    })?;
    Ok((cfg, hosts))
}
