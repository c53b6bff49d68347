//! HTTP API server command (`flowdesk serve`).

use anyhow::{Result, bail};
use std::path::PathBuf;

use flowdesk::config::Config;
use flowdesk::desk::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    // CLI flags sit on top of file and environment values.
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db_path) = db_path {
        config.server.db_path = db_path;
    }
    config.server.dev_mode |= dev;

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  - {}", problem);
        }
        bail!("Refusing to start with {} configuration problem(s)", problems.len());
    }

    start_server(ServerConfig::from(&config)).await
}
