//! CLI command implementations.
//!
//! | Module    | Commands handled       |
//! |-----------|------------------------|
//! | `init`    | `Init`                 |
//! | `serve`   | `Serve`                |
//! | `rules`   | `Rules`                |
//! | `report`  | `Report`               |
//! | `config`  | `Config`               |

pub mod config;
pub mod init;
pub mod report;
pub mod rules;
pub mod serve;

pub use config::cmd_config;
pub use init::cmd_init;
pub use report::cmd_report;
pub use rules::cmd_rules;
pub use serve::cmd_serve;

use anyhow::{Context, Result};
use std::time::Duration;

use flowdesk::config::Config;
use flowdesk::desk::db::DeskDb;

/// Open (creating if needed) the database named by the effective config.
pub(crate) fn open_db(config: &Config) -> Result<DeskDb> {
    DeskDb::new(
        &config.server.db_path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )
    .with_context(|| {
        format!(
            "Failed to open database at {}",
            config.server.db_path.display()
        )
    })
}
