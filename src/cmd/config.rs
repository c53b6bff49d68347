//! Configuration view and validation (`flowdesk config`).

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use flowdesk::config::{CONFIG_DIR, CONFIG_FILE, Config};

use super::super::ConfigCommands;

pub fn cmd_config(config: &Config, config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(CONFIG_DIR).join(CONFIG_FILE),
    };

    match command {
        None | Some(ConfigCommands::Show) => {
            if path.exists() {
                println!("# Config file: {}", path.display());
            } else {
                println!("# No config file at {}; showing defaults", path.display());
            }
            println!("# Effective values include FLOWDESK_* overrides");
            println!();
            print!("{}", toml::to_string_pretty(config)?);
        }
        Some(ConfigCommands::Validate) => {
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                bail!("{} configuration problem(s)", problems.len());
            }
        }
    }
    Ok(())
}
