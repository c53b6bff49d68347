//! Recurring rule commands (`flowdesk rules`).

use anyhow::{Result, bail};
use chrono::Utc;

use flowdesk::config::Config;
use flowdesk::desk::recurrence::RecurrenceEngine;

use super::super::RulesCommands;

pub fn cmd_rules(config: &Config, command: RulesCommands) -> Result<()> {
    let db = super::open_db(config)?;
    let engine = RecurrenceEngine::default();

    match command {
        RulesCommands::RunDue => {
            let summary = engine.run_due_rules(&db, Utc::now())?;
            if summary.executed.is_empty() && summary.failed.is_empty() {
                println!("No rules due.");
                return Ok(());
            }
            for done in &summary.executed {
                println!(
                    "Rule {} created {}{}",
                    done.rule_id,
                    done.ticket_number,
                    if done.is_completed { " (series complete)" } else { "" }
                );
            }
            for failed in &summary.failed {
                eprintln!("Rule {} failed: {}", failed.rule_id, failed.error);
            }
            if !summary.failed.is_empty() {
                bail!("{} rule(s) failed", summary.failed.len());
            }
        }
        RulesCommands::Execute { id } => {
            let outcome = engine.execute_rule(&db, id, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        RulesCommands::List => {
            let rules = db.list_rules()?;
            if rules.is_empty() {
                println!("No recurring rules.");
                return Ok(());
            }
            for rule in rules {
                println!(
                    "{:>4}  {:<8}  {:>3}/{:<3}  next={}  {}",
                    rule.id,
                    if rule.is_active { "active" } else { "inactive" },
                    rule.execution_count,
                    rule.recurrence_interval,
                    rule.next_execution_date.as_deref().unwrap_or("-"),
                    rule.name
                );
            }
        }
    }

    Ok(())
}
