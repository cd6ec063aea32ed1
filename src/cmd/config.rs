//! Configuration view and validation commands — `taskboard config`.

use anyhow::Result;
use taskboard::config::BoardConfig;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, config: &BoardConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli.config.clone().or_else(BoardConfig::default_path);

    match command {
        None | Some(ConfigCommands::Show) => {
            match &config_path {
                Some(path) if path.exists() => println!("Config file: {}", path.display()),
                _ => println!("No taskboard.toml found, using defaults"),
            }
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!();
            print!("{}", toml::to_string_pretty(config)?);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            let Some(path) = config_path else {
                anyhow::bail!("No config directory on this platform; pass --config <path>");
            };
            if path.exists() {
                println!("taskboard.toml already exists at {}", path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            BoardConfig::default().save(&path)?;
            println!("Created taskboard.toml at {}", path.display());
        }
    }

    Ok(())
}
