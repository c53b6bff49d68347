//! Per-user performance reports.
//!
//! Loading and aggregation are split: [`DeskDb::build_user_report`] pulls the
//! user's ticket facts in one query, and [`aggregate`] turns them into the
//! report body without touching the database.
//!
//! Whether a ticket is "done" for the recent and completed lists is decided
//! by its current stage's `is_final` flag alone. A ticket can sit in a final
//! stage while its status column still says `active`, or be marked
//! `completed` while still in a working stage.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::db::{DeskDb, fetch_user};
use super::models::{Priority, TicketStatus};
use super::time::{DayBound, format_ts, hours_between, normalize_input, parse_ts, round2};
use crate::config::ReportConfig;
use crate::errors::DeskError;

/// Inclusive bounds on ticket `created_at`. Both ends open means all time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl ReportWindow {
    pub fn all_time() -> Self {
        Self::default()
    }

    /// Parse raw query values. Blank strings are treated as absent, and a
    /// bare date covers the whole day on either end.
    pub fn parse(date_from: Option<&str>, date_to: Option<&str>) -> Result<Self, DeskError> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }
        let window = Self {
            date_from: present(date_from)
                .map(|s| normalize_input(s, DayBound::Start))
                .transpose()?,
            date_to: present(date_to)
                .map(|s| normalize_input(s, DayBound::End))
                .transpose()?,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), DeskError> {
        if let (Some(from), Some(to)) = (&self.date_from, &self.date_to)
            && from > to
        {
            return Err(DeskError::validation(format!(
                "date_from {} is after date_to {}",
                from, to
            )));
        }
        Ok(())
    }
}

/// One ticket of the user's, joined with its stage and process.
#[derive(Debug, Clone)]
pub struct TicketFact {
    pub ticket_id: i64,
    pub ticket_number: String,
    pub title: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub process_id: i64,
    pub process_name: String,
    pub stage_id: i64,
    pub stage_name: String,
    pub stage_order: i32,
    pub stage_is_final: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Early,
    OnTime,
    Late,
}

impl PerformanceStatus {
    /// `variance` is actual minus expected, in hours.
    pub fn classify(variance: f64, tolerance: f64) -> Self {
        if variance < -tolerance {
            Self::Early
        } else if variance > tolerance {
            Self::Late
        } else {
            Self::OnTime
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasicStats {
    pub total_tickets: usize,
    pub active_tickets: usize,
    pub completed_tickets: usize,
    pub cancelled_tickets: usize,
    pub archived_tickets: usize,
    pub overdue_tickets: usize,
    pub due_soon_tickets: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageBucket {
    pub process_id: i64,
    pub process_name: String,
    pub stage_id: i64,
    pub stage_name: String,
    pub order_index: i32,
    pub is_final: bool,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityBucket {
    pub priority: Priority,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketSummary {
    pub id: i64,
    pub ticket_number: String,
    pub title: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub process_name: String,
    pub stage_name: String,
    pub stage_is_final: bool,
    pub due_date: Option<String>,
    pub created_at: String,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedTicket {
    #[serde(flatten)]
    pub summary: TicketSummary,
    pub completed_at: Option<String>,
    pub variance_hours: Option<f64>,
    pub performance_status: Option<PerformanceStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceMetrics {
    pub evaluated_tickets: usize,
    pub early_count: usize,
    pub on_time_count: usize,
    pub late_count: usize,
    /// Signed sum of completion variance; positive means late overall.
    pub net_performance_hours: f64,
    pub average_variance_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportBody {
    pub basic_stats: BasicStats,
    pub stage_distribution: Vec<StageBucket>,
    pub priority_distribution: Vec<PriorityBucket>,
    pub recent_tickets: Vec<TicketSummary>,
    pub completed_tickets_details: Vec<CompletedTicket>,
    pub performance_metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub user: ReportUser,
    pub window: ReportWindow,
    pub generated_at: String,
    #[serde(flatten)]
    pub body: ReportBody,
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(count as f64 * 100.0 / total as f64)
    }
}

fn is_overdue(fact: &TicketFact, now: DateTime<Utc>) -> bool {
    fact.status == TicketStatus::Active && fact.due_date.is_some_and(|due| due < now)
}

fn summarize(fact: &TicketFact, now: DateTime<Utc>) -> TicketSummary {
    TicketSummary {
        id: fact.ticket_id,
        ticket_number: fact.ticket_number.clone(),
        title: fact.title.clone(),
        status: fact.status,
        priority: fact.priority,
        process_name: fact.process_name.clone(),
        stage_name: fact.stage_name.clone(),
        stage_is_final: fact.stage_is_final,
        due_date: fact.due_date.map(format_ts),
        created_at: format_ts(fact.created_at),
        is_overdue: is_overdue(fact, now),
    }
}

/// Completion variance in hours, when both ends are known.
fn variance_of(fact: &TicketFact) -> Option<f64> {
    match (fact.due_date, fact.completed_at) {
        (Some(due), Some(done)) => Some(hours_between(due, done)),
        _ => None,
    }
}

/// Turn a user's ticket facts into the report body.
pub fn aggregate(facts: &[TicketFact], now: DateTime<Utc>, config: &ReportConfig) -> ReportBody {
    let total = facts.len();
    let tolerance = config.on_time_tolerance_hours;
    let due_soon_until = TimeDelta::try_hours(config.due_soon_hours)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now);

    let mut stats = BasicStats {
        total_tickets: total,
        ..BasicStats::default()
    };
    for fact in facts {
        match fact.status {
            TicketStatus::Active => stats.active_tickets += 1,
            TicketStatus::Completed => stats.completed_tickets += 1,
            TicketStatus::Cancelled => stats.cancelled_tickets += 1,
            TicketStatus::Archived => stats.archived_tickets += 1,
        }
        if is_overdue(fact, now) {
            stats.overdue_tickets += 1;
        } else if fact.status == TicketStatus::Active
            && fact.due_date.is_some_and(|due| due <= due_soon_until)
        {
            stats.due_soon_tickets += 1;
        }
    }

    // Keyed so iteration yields process name, then stage order.
    let mut stages: BTreeMap<(&str, i64, i32, i64), StageBucket> = BTreeMap::new();
    for fact in facts {
        stages
            .entry((fact.process_name.as_str(), fact.process_id, fact.stage_order, fact.stage_id))
            .or_insert_with(|| StageBucket {
                process_id: fact.process_id,
                process_name: fact.process_name.clone(),
                stage_id: fact.stage_id,
                stage_name: fact.stage_name.clone(),
                order_index: fact.stage_order,
                is_final: fact.stage_is_final,
                count: 0,
                percentage: 0.0,
            })
            .count += 1;
    }
    let stage_distribution = stages
        .into_values()
        .map(|mut bucket| {
            bucket.percentage = percentage(bucket.count, total);
            bucket
        })
        .collect();

    let priority_distribution = Priority::BY_URGENCY
        .iter()
        .filter_map(|&priority| {
            let count = facts.iter().filter(|f| f.priority == priority).count();
            (count > 0).then(|| PriorityBucket {
                priority,
                count,
                percentage: percentage(count, total),
            })
        })
        .collect();

    let mut open: Vec<&TicketFact> = facts.iter().filter(|f| !f.stage_is_final).collect();
    open.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.ticket_id.cmp(&a.ticket_id))
    });
    let recent_tickets = open
        .iter()
        .take(config.recent_limit)
        .map(|f| summarize(f, now))
        .collect();

    let mut done: Vec<&TicketFact> = facts
        .iter()
        .filter(|f| f.status == TicketStatus::Completed && !f.stage_is_final)
        .collect();
    done.sort_by(|a, b| {
        b.completed_at
            .cmp(&a.completed_at)
            .then(b.ticket_id.cmp(&a.ticket_id))
    });
    let completed_tickets_details = done
        .iter()
        .take(config.completed_limit)
        .map(|f| {
            let variance = variance_of(f);
            CompletedTicket {
                summary: summarize(f, now),
                completed_at: f.completed_at.map(format_ts),
                variance_hours: variance.map(round2),
                performance_status: variance.map(|v| PerformanceStatus::classify(v, tolerance)),
            }
        })
        .collect();

    // Aggregate scoring counts every completed ticket, final stage or not.
    let mut metrics = PerformanceMetrics::default();
    let mut net = 0.0;
    for variance in facts
        .iter()
        .filter(|f| f.status == TicketStatus::Completed)
        .filter_map(variance_of)
    {
        metrics.evaluated_tickets += 1;
        net += variance;
        match PerformanceStatus::classify(variance, tolerance) {
            PerformanceStatus::Early => metrics.early_count += 1,
            PerformanceStatus::OnTime => metrics.on_time_count += 1,
            PerformanceStatus::Late => metrics.late_count += 1,
        }
    }
    metrics.net_performance_hours = round2(net);
    metrics.average_variance_hours =
        (metrics.evaluated_tickets > 0).then(|| round2(net / metrics.evaluated_tickets as f64));

    ReportBody {
        basic_stats: stats,
        stage_distribution,
        priority_distribution,
        recent_tickets,
        completed_tickets_details,
        performance_metrics: metrics,
    }
}

impl DeskDb {
    /// Build the report for `user_id`. Read-only.
    pub fn build_user_report(
        &self,
        user_id: i64,
        window: &ReportWindow,
        config: &ReportConfig,
        now: DateTime<Utc>,
    ) -> Result<UserReport, DeskError> {
        window.validate()?;
        let user = fetch_user(self.conn(), user_id)
            .map_err(DeskError::Database)?
            .ok_or(DeskError::UserNotFound { id: user_id })?;
        let facts = self
            .load_report_facts(user_id, window)
            .map_err(DeskError::Database)?;
        tracing::debug!(user_id, tickets = facts.len(), "building user report");

        Ok(UserReport {
            user: ReportUser {
                id: user.id,
                username: user.username,
                full_name: user.full_name,
            },
            window: window.clone(),
            generated_at: format_ts(now),
            body: aggregate(&facts, now, config),
        })
    }

    /// Tickets the user owns or holds an assignee link on, excluding soft
    /// deleted ones, created inside the window.
    pub fn load_report_facts(&self, user_id: i64, window: &ReportWindow) -> Result<Vec<TicketFact>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT t.id, t.ticket_number, t.title, t.status, t.priority,
                        p.id, p.name, s.id, s.name, s.order_index, s.is_final,
                        t.due_date, t.completed_at, t.created_at
                 FROM tickets t
                 JOIN stages s ON s.id = t.current_stage_id
                 JOIN processes p ON p.id = t.process_id
                 WHERE t.deleted_at IS NULL
                   AND (t.assigned_to = ?1 OR EXISTS (
                        SELECT 1 FROM ticket_assignments a
                        WHERE a.ticket_id = t.id AND a.user_id = ?1 AND a.role = 'assignee'))
                   AND (?2 IS NULL OR t.created_at >= ?2)
                   AND (?3 IS NULL OR t.created_at <= ?3)
                 ORDER BY t.id",
            )
            .context("Failed to prepare report query")?;
        let rows = stmt
            .query_map(params![user_id, window.date_from, window.date_to], |row| {
                Ok(FactRow {
                    ticket_id: row.get(0)?,
                    ticket_number: row.get(1)?,
                    title: row.get(2)?,
                    status: row.get(3)?,
                    priority: row.get(4)?,
                    process_id: row.get(5)?,
                    process_name: row.get(6)?,
                    stage_id: row.get(7)?,
                    stage_name: row.get(8)?,
                    stage_order: row.get(9)?,
                    stage_is_final: row.get(10)?,
                    due_date: row.get(11)?,
                    completed_at: row.get(12)?,
                    created_at: row.get(13)?,
                })
            })
            .context("Failed to query report facts")?;
        let mut facts = Vec::new();
        for row in rows {
            facts.push(row.context("Failed to read report row")?.into_fact()?);
        }
        Ok(facts)
    }
}

struct FactRow {
    ticket_id: i64,
    ticket_number: String,
    title: String,
    status: String,
    priority: String,
    process_id: i64,
    process_name: String,
    stage_id: i64,
    stage_name: String,
    stage_order: i32,
    stage_is_final: bool,
    due_date: Option<String>,
    completed_at: Option<String>,
    created_at: String,
}

impl FactRow {
    fn into_fact(self) -> Result<TicketFact> {
        let status = self
            .status
            .parse::<TicketStatus>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket status")?;
        let priority = self
            .priority
            .parse::<Priority>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket priority")?;
        Ok(TicketFact {
            ticket_id: self.ticket_id,
            ticket_number: self.ticket_number,
            title: self.title,
            status,
            priority,
            process_id: self.process_id,
            process_name: self.process_name,
            stage_id: self.stage_id,
            stage_name: self.stage_name,
            stage_order: self.stage_order,
            stage_is_final: self.stage_is_final,
            due_date: self.due_date.as_deref().map(parse_ts).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::db::fixtures::*;
    use crate::desk::models::{AssignmentRole, NewTicket};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn fact(id: i64, status: TicketStatus, priority: Priority) -> TicketFact {
        TicketFact {
            ticket_id: id,
            ticket_number: format!("TKT-{:06}", id),
            title: format!("Ticket {id}"),
            status,
            priority,
            process_id: 1,
            process_name: "Support".into(),
            stage_id: 10,
            stage_name: "Todo".into(),
            stage_order: 0,
            stage_is_final: false,
            due_date: None,
            completed_at: None,
            created_at: at(2024, 1, 1, 0) + TimeDelta::hours(id),
        }
    }

    fn in_stage(mut f: TicketFact, process: (i64, &str), stage: (i64, &str, i32, bool)) -> TicketFact {
        f.process_id = process.0;
        f.process_name = process.1.into();
        f.stage_id = stage.0;
        f.stage_name = stage.1.into();
        f.stage_order = stage.2;
        f.stage_is_final = stage.3;
        f
    }

    fn assigned(process_id: i64, user_id: i64, title: &str) -> NewTicket {
        let mut t = ticket(process_id, title);
        t.assigned_to = Some(user_id);
        t
    }

    #[test]
    fn test_window_parse() {
        let w = ReportWindow::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        assert_eq!(w.date_from.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(w.date_to.as_deref(), Some("2024-01-31T23:59:59Z"));

        assert_eq!(ReportWindow::parse(Some(""), None).unwrap(), ReportWindow::all_time());
        let padded = ReportWindow::parse(Some("  2024-01-01 "), Some("   ")).unwrap();
        assert_eq!(padded.date_from.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert!(padded.date_to.is_none());

        let err = ReportWindow::parse(Some("2024-02-01"), Some("2024-01-01")).unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
        let err = ReportWindow::parse(Some("yesterday"), None).unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }

    #[test]
    fn test_classify_with_tolerance() {
        assert_eq!(PerformanceStatus::classify(-3.0, 1.0), PerformanceStatus::Early);
        assert_eq!(PerformanceStatus::classify(-1.0, 1.0), PerformanceStatus::OnTime);
        assert_eq!(PerformanceStatus::classify(0.5, 1.0), PerformanceStatus::OnTime);
        assert_eq!(PerformanceStatus::classify(1.01, 1.0), PerformanceStatus::Late);
        assert_eq!(PerformanceStatus::classify(0.0, 0.0), PerformanceStatus::OnTime);
        assert_eq!(PerformanceStatus::classify(0.1, 0.0), PerformanceStatus::Late);
    }

    #[test]
    fn test_aggregate_empty_degrades_to_zero() {
        let body = aggregate(&[], at(2024, 1, 1, 0), &ReportConfig::default());
        assert_eq!(body.basic_stats, BasicStats::default());
        assert!(body.stage_distribution.is_empty());
        assert!(body.priority_distribution.is_empty());
        assert!(body.recent_tickets.is_empty());
        assert!(body.completed_tickets_details.is_empty());
        assert_eq!(body.performance_metrics.evaluated_tickets, 0);
        assert_eq!(body.performance_metrics.net_performance_hours, 0.0);
        assert!(body.performance_metrics.average_variance_hours.is_none());
    }

    #[test]
    fn test_overdue_counts_only_active() {
        let now = at(2024, 3, 10, 12);
        let yesterday = now - TimeDelta::days(1);
        let mut active = fact(1, TicketStatus::Active, Priority::Low);
        active.due_date = Some(yesterday);
        let mut done = fact(2, TicketStatus::Completed, Priority::Low);
        done.due_date = Some(yesterday);
        done.completed_at = Some(yesterday);
        let mut soon = fact(3, TicketStatus::Active, Priority::Low);
        soon.due_date = Some(now + TimeDelta::hours(5));
        let mut later = fact(4, TicketStatus::Active, Priority::Low);
        later.due_date = Some(now + TimeDelta::days(5));

        let body = aggregate(&[active, done, soon, later], now, &ReportConfig::default());
        assert_eq!(body.basic_stats.overdue_tickets, 1);
        assert_eq!(body.basic_stats.due_soon_tickets, 1);
        assert_eq!(body.basic_stats.active_tickets, 3);
        assert_eq!(body.basic_stats.completed_tickets, 1);
        assert!(body.recent_tickets.iter().any(|t| t.id == 1 && t.is_overdue));
        assert!(body.recent_tickets.iter().any(|t| t.id == 2 && !t.is_overdue));
    }

    #[test]
    fn test_stage_distribution_order_and_percentages() {
        let facts = vec![
            in_stage(fact(1, TicketStatus::Active, Priority::Low), (2, "Zeta"), (20, "Open", 0, false)),
            in_stage(fact(2, TicketStatus::Active, Priority::Low), (1, "Alpha"), (12, "Doing", 1, false)),
            in_stage(fact(3, TicketStatus::Active, Priority::Low), (1, "Alpha"), (11, "Backlog", 0, false)),
            in_stage(fact(4, TicketStatus::Completed, Priority::Low), (1, "Alpha"), (13, "Done", 2, true)),
            in_stage(fact(5, TicketStatus::Completed, Priority::Low), (1, "Alpha"), (13, "Done", 2, true)),
            in_stage(fact(6, TicketStatus::Active, Priority::Low), (1, "Alpha"), (12, "Doing", 1, false)),
        ];
        let body = aggregate(&facts, at(2024, 1, 2, 0), &ReportConfig::default());
        let order: Vec<(&str, &str, usize)> = body
            .stage_distribution
            .iter()
            .map(|b| (b.process_name.as_str(), b.stage_name.as_str(), b.count))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Alpha", "Backlog", 1),
                ("Alpha", "Doing", 2),
                ("Alpha", "Done", 2),
                ("Zeta", "Open", 1),
            ]
        );
        assert_eq!(body.stage_distribution[0].percentage, 16.67);
        assert_eq!(body.stage_distribution[1].percentage, 33.33);
        assert!(body.stage_distribution[2].is_final);
    }

    #[test]
    fn test_priority_distribution_urgency_order_skips_zero() {
        let facts = vec![
            fact(1, TicketStatus::Active, Priority::Low),
            fact(2, TicketStatus::Active, Priority::Urgent),
            fact(3, TicketStatus::Active, Priority::Low),
            fact(4, TicketStatus::Active, Priority::Medium),
        ];
        let body = aggregate(&facts, at(2024, 1, 2, 0), &ReportConfig::default());
        let got: Vec<(Priority, usize, f64)> = body
            .priority_distribution
            .iter()
            .map(|b| (b.priority, b.count, b.percentage))
            .collect();
        assert_eq!(
            got,
            vec![
                (Priority::Urgent, 1, 25.0),
                (Priority::Medium, 1, 25.0),
                (Priority::Low, 2, 50.0),
            ]
        );
    }

    #[test]
    fn test_final_stage_excluded_from_lists_but_scored() {
        let due = at(2024, 2, 1, 12);
        let mut working = fact(1, TicketStatus::Completed, Priority::High);
        working.due_date = Some(due);
        working.completed_at = Some(due + TimeDelta::hours(5));

        let mut shipped = in_stage(
            fact(2, TicketStatus::Completed, Priority::High),
            (1, "Support"),
            (14, "Done", 3, true),
        );
        shipped.due_date = Some(due);
        shipped.completed_at = Some(due - TimeDelta::hours(4));

        // Final stage but status never flipped.
        let stale = in_stage(
            fact(3, TicketStatus::Active, Priority::High),
            (1, "Support"),
            (14, "Done", 3, true),
        );

        let body = aggregate(&[working, shipped, stale], at(2024, 3, 1, 0), &ReportConfig::default());
        let recent: Vec<i64> = body.recent_tickets.iter().map(|t| t.id).collect();
        assert_eq!(recent, vec![1]);
        assert!(body.recent_tickets.iter().all(|t| !t.stage_is_final));

        assert_eq!(body.completed_tickets_details.len(), 1);
        let detail = &body.completed_tickets_details[0];
        assert_eq!(detail.summary.id, 1);
        assert_eq!(detail.variance_hours, Some(5.0));
        assert_eq!(detail.performance_status, Some(PerformanceStatus::Late));

        let m = &body.performance_metrics;
        assert_eq!(m.evaluated_tickets, 2);
        assert_eq!(m.late_count, 1);
        assert_eq!(m.early_count, 1);
        assert_eq!(m.net_performance_hours, 1.0);
        assert_eq!(m.average_variance_hours, Some(0.5));
    }

    #[test]
    fn test_completed_details_without_due_date_have_no_score() {
        let mut f = fact(1, TicketStatus::Completed, Priority::Low);
        f.completed_at = Some(at(2024, 1, 5, 0));
        let body = aggregate(&[f], at(2024, 2, 1, 0), &ReportConfig::default());
        let detail = &body.completed_tickets_details[0];
        assert!(detail.variance_hours.is_none());
        assert!(detail.performance_status.is_none());
        assert_eq!(body.performance_metrics.evaluated_tickets, 0);
    }

    #[test]
    fn test_lists_respect_limits_and_order() {
        let facts: Vec<TicketFact> = (1..=6)
            .map(|i| fact(i, TicketStatus::Active, Priority::Low))
            .collect();
        let config = ReportConfig {
            recent_limit: 4,
            ..ReportConfig::default()
        };
        let body = aggregate(&facts, at(2024, 2, 1, 0), &config);
        let ids: Vec<i64> = body.recent_tickets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![6, 5, 4, 3]);
    }

    #[test]
    fn test_report_five_tickets_two_final() -> Result<()> {
        let s = seed();
        let pid = s.process.process.id;
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(s.db.create_ticket(&assigned(pid, s.agent.id, &format!("T{i}")))?.id);
        }
        s.db.move_ticket(ids[0], s.stage("Done").id, None)?;
        s.db.move_ticket(ids[1], s.stage("Done").id, None)?;
        s.db.move_ticket(ids[2], s.stage("Review").id, None)?;

        let report = s.db.build_user_report(
            s.agent.id,
            &ReportWindow::all_time(),
            &ReportConfig::default(),
            Utc::now(),
        )?;
        assert_eq!(report.body.basic_stats.total_tickets, 5);
        assert_eq!(report.body.recent_tickets.len(), 3);
        assert!(report.body.recent_tickets.iter().all(|t| !t.stage_is_final));
        assert!(report.body.completed_tickets_details.iter().all(|t| !t.summary.stage_is_final));
        assert_eq!(report.body.basic_stats.completed_tickets, 2);
        assert_eq!(report.user.username, "alice");
        Ok(())
    }

    #[test]
    fn test_report_for_user_without_tickets() -> Result<()> {
        let s = seed();
        s.db.create_ticket(&assigned(s.process.process.id, s.agent.id, "Not yours"))?;
        let report = s.db.build_user_report(
            s.manager.id,
            &ReportWindow::all_time(),
            &ReportConfig::default(),
            Utc::now(),
        )?;
        assert_eq!(report.body.basic_stats, BasicStats::default());
        assert!(report.body.recent_tickets.is_empty());
        assert!(report.body.stage_distribution.is_empty());
        Ok(())
    }

    #[test]
    fn test_report_unknown_user_and_bad_window() {
        let s = seed();
        let err = s
            .db
            .build_user_report(999, &ReportWindow::all_time(), &ReportConfig::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DeskError::UserNotFound { id: 999 }));

        let backwards = ReportWindow {
            date_from: Some("2024-02-01T00:00:00Z".into()),
            date_to: Some("2024-01-01T00:00:00Z".into()),
        };
        let err = s
            .db
            .build_user_report(s.agent.id, &backwards, &ReportConfig::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }

    #[test]
    fn test_report_window_filters_on_created_at() -> Result<()> {
        let s = seed();
        let pid = s.process.process.id;
        for (day, title) in [(1, "Before"), (15, "Inside"), (31, "Edge")] {
            s.db.create_ticket_at(&assigned(pid, s.agent.id, title), at(2024, 1, day, 10))?;
        }
        s.db.create_ticket_at(&assigned(pid, s.agent.id, "After"), at(2024, 2, 1, 0))?;

        let window = ReportWindow::parse(Some("2024-01-02"), Some("2024-01-31"))?;
        let report = s
            .db
            .build_user_report(s.agent.id, &window, &ReportConfig::default(), at(2024, 3, 1, 0))?;
        let titles: Vec<&str> = report.body.recent_tickets.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Edge", "Inside"]);
        Ok(())
    }

    #[test]
    fn test_report_includes_assignee_links_and_skips_deleted() -> Result<()> {
        let s = seed();
        let pid = s.process.process.id;
        let handed_over = s.db.create_ticket(&assigned(pid, s.agent.id, "Handed over"))?;
        s.db.assign_user(handed_over.id, s.manager.id, AssignmentRole::Assignee)?;
        let gone = s.db.create_ticket(&assigned(pid, s.agent.id, "Deleted"))?;
        s.db.delete_ticket(gone.id)?;
        let reviewed = s.db.create_ticket(&ticket(pid, "Reviewed only"))?;
        s.db.assign_user(reviewed.id, s.agent.id, AssignmentRole::Reviewer)?;

        let now = Utc::now();
        let cfg = ReportConfig::default();
        let agent = s.db.build_user_report(s.agent.id, &ReportWindow::all_time(), &cfg, now)?;
        let manager = s.db.build_user_report(s.manager.id, &ReportWindow::all_time(), &cfg, now)?;
        assert_eq!(agent.body.basic_stats.total_tickets, 1);
        assert_eq!(agent.body.recent_tickets[0].id, handed_over.id);
        assert_eq!(manager.body.basic_stats.total_tickets, 1);
        Ok(())
    }

    #[test]
    fn test_report_scores_completion_against_due_date() -> Result<()> {
        let s = seed();
        let pid = s.process.process.id;
        let mut late = assigned(pid, s.agent.id, "Late one");
        late.due_date = Some("2024-04-01T12:00:00Z".into());
        let late = s.db.create_ticket_at(&late, at(2024, 3, 25, 9))?;
        s.db.update_ticket_status_at(late.id, TicketStatus::Completed, at(2024, 4, 1, 15))?;

        let mut early = assigned(pid, s.agent.id, "Early one");
        early.due_date = Some("2024-04-01".into());
        let early = s.db.create_ticket_at(&early, at(2024, 3, 25, 9))?;
        s.db.move_ticket_at(early.id, s.stage("Done").id, None, at(2024, 3, 31, 23))?;

        let report = s.db.build_user_report(
            s.agent.id,
            &ReportWindow::all_time(),
            &ReportConfig::default(),
            at(2024, 4, 2, 0),
        )?;
        let details = &report.body.completed_tickets_details;
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].summary.id, late.id);
        assert_eq!(details[0].variance_hours, Some(3.0));
        assert_eq!(details[0].performance_status, Some(PerformanceStatus::Late));

        let m = &report.body.performance_metrics;
        assert_eq!(m.evaluated_tickets, 2);
        assert_eq!(m.late_count, 1);
        assert_eq!(m.early_count, 1);
        // +3h and -24h59m59s
        assert_eq!(m.net_performance_hours, -22.0);
        Ok(())
    }

    #[test]
    fn test_report_json_shape() -> Result<()> {
        let s = seed();
        let report = s.db.build_user_report(
            s.agent.id,
            &ReportWindow::all_time(),
            &ReportConfig::default(),
            at(2024, 1, 1, 0),
        )?;
        let json = serde_json::to_value(&report).unwrap();
        for key in [
            "basic_stats",
            "stage_distribution",
            "priority_distribution",
            "recent_tickets",
            "completed_tickets_details",
            "performance_metrics",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["basic_stats"]["overdue_tickets"], 0);
        assert_eq!(json["generated_at"], "2024-01-01T00:00:00Z");
        Ok(())
    }
}
