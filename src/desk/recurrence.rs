//! Recurring-rule execution.
//!
//! One call to [`RecurrenceEngine::execute_rule`] is one "tick": a ticket is
//! spawned from the rule's template, the assignee is linked, and the rule's
//! execution counter advances. Everything except the notification happens
//! in a single `BEGIN IMMEDIATE` transaction, and the counter update is
//! guarded so a second process racing on the same rule cannot overshoot
//! `recurrence_interval`.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Months, TimeDelta, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

use super::db::{
    DeskDb, fetch_rule, insert_assignment, insert_history, insert_ticket, resolve_stage,
};
use super::models::*;
use super::notify::{Notifier, StoreNotifier};
use super::time::format_ts;
use crate::errors::DeskError;

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionInfo {
    pub current_execution: i64,
    pub total_executions: i64,
    pub is_completed: bool,
    pub next_execution_date: Option<String>,
}

/// Delivery result for the assignee notification. Failure is reported here
/// rather than failing the execution.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub ticket: Ticket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationOutcome>,
    pub execution_info: ExecutionInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedRule {
    pub rule_id: i64,
    pub ticket_id: i64,
    pub ticket_number: String,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRule {
    pub rule_id: i64,
    pub error: String,
}

/// Result of one scheduler pass over the due rules.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DueRunSummary {
    pub executed: Vec<ExecutedRule>,
    pub failed: Vec<FailedRule>,
}

#[derive(Clone)]
pub struct RecurrenceEngine {
    notifier: Arc<dyn Notifier>,
}

impl Default for RecurrenceEngine {
    fn default() -> Self {
        Self::new(Arc::new(StoreNotifier))
    }
}

impl RecurrenceEngine {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Execute one tick of `rule_id` as of `now`. Not idempotent: every
    /// successful call spawns a new ticket.
    pub fn execute_rule(
        &self,
        db: &DeskDb,
        rule_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, DeskError> {
        let now_ts = format_ts(now);
        let tx = db.immediate_transaction().map_err(DeskError::Database)?;

        let rule = fetch_rule(&tx, rule_id)
            .map_err(DeskError::Database)?
            .ok_or(DeskError::RuleNotFound { id: rule_id })?;
        if !rule.is_active {
            return Err(DeskError::RuleNotExecutable {
                id: rule_id,
                reason: "rule is inactive".to_string(),
            });
        }
        if rule.is_exhausted() {
            return Err(DeskError::RuleNotExecutable {
                id: rule_id,
                reason: format!(
                    "rule already ran {} of {} times",
                    rule.execution_count, rule.recurrence_interval
                ),
            });
        }

        let ticket =
            spawn_ticket(&tx, &rule, &now_ts).map_err(DeskError::TicketCreationFailed)?;
        let assignment = match rule.assignee_id {
            Some(user_id) => Some(
                insert_assignment(&tx, ticket.id, user_id, AssignmentRole::Assignee, &now_ts)
                    .map_err(DeskError::TicketCreationFailed)?,
            ),
            None => None,
        };

        let advanced = tx
            .execute(
                "UPDATE recurring_rules
                 SET execution_count = execution_count + 1, last_executed_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND is_active = 1 AND execution_count < recurrence_interval",
                params![rule.id, now_ts],
            )
            .context("Failed to advance execution count")
            .map_err(DeskError::Database)?;
        if advanced == 0 {
            return Err(DeskError::RuleNotExecutable {
                id: rule_id,
                reason: "rule changed while executing".to_string(),
            });
        }

        let (current, total) = execution_progress(&tx, rule.id).map_err(DeskError::Database)?;
        let is_completed = current >= total;
        let next_execution_date = if is_completed {
            None
        } else {
            Some(format_ts(next_execution_after(
                now,
                rule.cadence_value,
                rule.cadence_unit,
            )?))
        };
        tx.execute(
            "UPDATE recurring_rules
             SET is_active = ?2, next_execution_date = ?3
             WHERE id = ?1",
            params![rule.id, !is_completed, next_execution_date],
        )
        .context("Failed to schedule next execution")
        .map_err(DeskError::Database)?;

        tx.commit()
            .context("Failed to commit rule execution")
            .map_err(DeskError::Database)?;

        tracing::info!(
            rule_id,
            ticket_id = ticket.id,
            execution = current,
            total,
            is_completed,
            "executed recurring rule"
        );

        let notification = rule
            .assignee_id
            .map(|user_id| self.notify_assignee(db, &rule, &ticket, user_id, now));

        Ok(ExecutionOutcome {
            ticket,
            assignment,
            notification,
            execution_info: ExecutionInfo {
                current_execution: current,
                total_executions: total,
                is_completed,
                next_execution_date,
            },
        })
    }

    /// One scheduler pass: execute every active rule due at or before `now`.
    /// A failing rule is logged and recorded, and the pass continues.
    pub fn run_due_rules(&self, db: &DeskDb, now: DateTime<Utc>) -> Result<DueRunSummary, DeskError> {
        let due = db.list_due_rules(now).map_err(DeskError::from_storage)?;
        tracing::info!(due = due.len(), "running due recurring rules");

        let mut summary = DueRunSummary::default();
        for rule in due {
            match self.execute_rule(db, rule.id, now) {
                Ok(outcome) => summary.executed.push(ExecutedRule {
                    rule_id: rule.id,
                    ticket_id: outcome.ticket.id,
                    ticket_number: outcome.ticket.ticket_number,
                    is_completed: outcome.execution_info.is_completed,
                }),
                Err(e) => {
                    tracing::warn!(rule_id = rule.id, error = %e, "recurring rule failed");
                    summary.failed.push(FailedRule {
                        rule_id: rule.id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(summary)
    }

    fn notify_assignee(
        &self,
        db: &DeskDb,
        rule: &RecurringRule,
        ticket: &Ticket,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> NotificationOutcome {
        let message = NewNotification {
            user_id,
            title: "Recurring ticket created".to_string(),
            message: format!(
                "{} was created from recurring rule '{}'",
                ticket.ticket_number, rule.name
            ),
            notification_type: NotificationType::RecurringTicket,
            ticket_id: Some(ticket.id),
        };
        match self.notifier.deliver(db, &message, at) {
            Ok(notification) => NotificationOutcome {
                sent: true,
                notification: Some(notification),
                error: None,
            },
            Err(e) => {
                tracing::warn!(
                    rule_id = rule.id,
                    ticket_id = ticket.id,
                    user_id,
                    error = %e,
                    "notification delivery failed"
                );
                NotificationOutcome {
                    sent: false,
                    notification: None,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }
}

fn spawn_ticket(conn: &Connection, rule: &RecurringRule, now: &str) -> anyhow::Result<Ticket> {
    let stage = resolve_stage(conn, rule.process_id, rule.target_stage_id)?;
    let new = NewTicket {
        title: rule.title.clone(),
        description: rule.description.clone(),
        process_id: rule.process_id,
        stage_id: Some(stage.id),
        assigned_to: rule.assignee_id,
        created_by: rule.created_by,
        recurring_rule_id: Some(rule.id),
        priority: rule.priority,
        due_date: None,
    };
    let ticket = insert_ticket(conn, &new, &stage, now)?;
    insert_history(conn, ticket.id, None, stage.id, rule.created_by, now)?;
    Ok(ticket)
}

fn execution_progress(conn: &Connection, rule_id: i64) -> anyhow::Result<(i64, i64)> {
    conn.query_row(
        "SELECT execution_count, recurrence_interval FROM recurring_rules WHERE id = ?1",
        params![rule_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .context("Failed to read execution progress")
}

/// `now` advanced by one cadence. Months use calendar arithmetic, clamping
/// to the last day of shorter months.
pub fn next_execution_after(
    now: DateTime<Utc>,
    value: i64,
    unit: CadenceUnit,
) -> Result<DateTime<Utc>, DeskError> {
    if value < 1 {
        return Err(DeskError::validation(format!(
            "cadence_value must be at least 1, got {}",
            value
        )));
    }
    let next = match unit {
        CadenceUnit::Hours => TimeDelta::try_hours(value).and_then(|d| now.checked_add_signed(d)),
        CadenceUnit::Days => TimeDelta::try_days(value).and_then(|d| now.checked_add_signed(d)),
        CadenceUnit::Weeks => TimeDelta::try_weeks(value).and_then(|d| now.checked_add_signed(d)),
        CadenceUnit::Months => u32::try_from(value)
            .ok()
            .and_then(|m| now.checked_add_months(Months::new(m))),
    };
    next.ok_or_else(|| {
        DeskError::validation(format!(
            "cadence of {} {} overflows the calendar",
            value,
            unit.as_str()
        ))
    })
}
