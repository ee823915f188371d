//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands;
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", commands::resolve_config_path(global).display());
        }
        ConfigCommand::Show => {
            let cfg = commands::load(global)?;
            print!("{}", cfg.to_redacted_toml()?);
        }
    }
    Ok(())
}
