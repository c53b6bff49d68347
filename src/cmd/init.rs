//! Database and config bootstrap (`flowdesk init`).

use anyhow::Result;
use std::path::{Path, PathBuf};

use flowdesk::config::{CONFIG_DIR, CONFIG_FILE, Config};

pub fn cmd_init(mut config: Config, config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<()> {
    if let Some(path) = db_path {
        config.server.db_path = path;
    }

    super::open_db(&config)?;
    tracing::info!(db_path = %config.server.db_path.display(), "database initialized");
    println!("Database initialized at {}", config.server.db_path.display());

    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(CONFIG_DIR).join(CONFIG_FILE),
    };
    if config_path.exists() {
        println!("Using existing config at {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(&config_path)?;
        println!("Wrote default config to {}", config_path.display());
    }

    Ok(())
}
