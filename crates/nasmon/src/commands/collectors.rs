//! `nasmon collectors`: the registry, with per-server effective settings
//! when a config is available.

use std::time::Duration;

use nasmon_core::collector::registry::{self, Source};
use nasmon_core::config::DEFAULT_SCAN_INTERVAL;

use crate::cli::GlobalOpts;
use crate::commands;
use crate::error::CliError;

fn row(name: &str, source: Source, legacy: bool, interval: Duration, enabled: Option<bool>) -> String {
    let legacy = if legacy { "yes" } else { "no" };
    let source = source.to_string();
    let mut line = format!("{name:<12} {source:<7} {legacy:<7} {:>5}s", interval.as_secs());
    if let Some(enabled) = enabled {
        line.push_str(if enabled { "  enabled" } else { "  disabled" });
    }
    line
}

fn header(with_state: bool) -> String {
    let mut line = format!("{:<12} {:<7} {:<7} {:>6}", "NAME", "SOURCE", "LEGACY", "EVERY");
    if with_state {
        line.push_str("  STATE");
    }
    line
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = commands::load(global)?;

    if cfg.servers.is_empty() {
        println!("{}", header(false));
        for factory in registry::REGISTRY {
            let interval = factory.default_interval.unwrap_or(DEFAULT_SCAN_INTERVAL);
            println!("{}", row(factory.name, factory.source, factory.needs_legacy_auth, interval, None));
        }
        return Ok(());
    }

    let (_, hosts) = commands::load_hosts(global)?;
    for (i, host) in hosts.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("[{}]", host.name);
        println!("{}", header(true));
        for (info, source, enabled) in registry::catalog(host) {
            println!(
                "{}",
                row(
                    info.name,
                    source,
                    info.needs_legacy_auth,
                    Duration::from_secs(info.interval_secs),
                    Some(enabled),
                )
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_line_up_with_header() {
        let line = row("memory", Source::Legacy, true, Duration::from_secs(30), Some(false));
        assert_eq!(line, "memory       legacy  yes        30s  disabled");
        assert_eq!(header(true).find("STATE"), line.find("disabled"));
    }
}
