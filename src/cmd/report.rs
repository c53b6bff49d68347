//! Report commands (`flowdesk report`).

use anyhow::Result;
use chrono::Utc;

use flowdesk::config::Config;
use flowdesk::desk::report::ReportWindow;

use super::super::ReportCommands;

pub fn cmd_report(config: &Config, command: ReportCommands) -> Result<()> {
    match command {
        ReportCommands::User { id, from, to } => {
            let window = ReportWindow::parse(from.as_deref(), to.as_deref())?;
            let db = super::open_db(config)?;
            let report = db.build_user_report(id, &window, &config.reports, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
