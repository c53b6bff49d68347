use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Agent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Agent => "agent",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "agent" => Ok(Self::Agent),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_user_role")]
    pub role: UserRole,
}

fn default_user_role() -> UserRole {
    UserRole::Agent
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub id: i64,
    pub process_id: i64,
    pub name: String,
    pub order_index: i32,
    pub is_initial: bool,
    pub is_final: bool,
    pub color: Option<String>,
}

/// Stage definition as supplied when a process is created or extended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStage {
    pub name: String,
    pub order_index: i32,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProcess {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<NewStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub process: Process,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    Completed,
    Cancelled,
    Archived,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Invalid ticket status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Report ordering: most pressing first.
    pub const BY_URGENCY: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub process_id: i64,
    pub current_stage_id: i64,
    pub assigned_to: Option<i64>,
    pub created_by: Option<i64>,
    pub recurring_rule_id: Option<i64>,
    pub status: TicketStatus,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to open a ticket. Stage resolution happens in the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub process_id: i64,
    #[serde(default)]
    pub stage_id: Option<i64>,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(skip)]
    pub recurring_rule_id: Option<i64>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    /// Date-only values mean end of that day.
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    Assignee,
    Reviewer,
}

impl AssignmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignee => "assignee",
            Self::Reviewer => "reviewer",
        }
    }
}

impl FromStr for AssignmentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assignee" => Ok(Self::Assignee),
            "reviewer" => Ok(Self::Reviewer),
            _ => Err(format!("Invalid assignment role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub role: AssignmentRole,
    pub assigned_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub id: i64,
    pub ticket_id: i64,
    pub from_stage_id: Option<i64>,
    pub to_stage_id: i64,
    pub moved_by: Option<i64>,
    pub moved_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub stage: Stage,
    pub assignments: Vec<Assignment>,
    pub history: Vec<StageTransition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TicketCreated,
    TicketAssigned,
    ReviewRequested,
    RecurringTicket,
    CommentAdded,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketCreated => "ticket_created",
            Self::TicketAssigned => "ticket_assigned",
            Self::ReviewRequested => "review_requested",
            Self::RecurringTicket => "recurring_ticket",
            Self::CommentAdded => "comment_added",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket_created" => Ok(Self::TicketCreated),
            "ticket_assigned" => Ok(Self::TicketAssigned),
            "review_requested" => Ok(Self::ReviewRequested),
            "recurring_ticket" => Ok(Self::RecurringTicket),
            "comment_added" => Ok(Self::CommentAdded),
            _ => Err(format!("Invalid notification type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub ticket_id: Option<i64>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub ticket_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CadenceUnit {
    Hours,
    Days,
    Weeks,
    Months,
}

impl CadenceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
        }
    }
}

impl FromStr for CadenceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hours" => Ok(Self::Hours),
            "days" => Ok(Self::Days),
            "weeks" => Ok(Self::Weeks),
            "months" => Ok(Self::Months),
            _ => Err(format!("Invalid cadence unit: {}", s)),
        }
    }
}

/// A ticket template plus schedule, capped at `recurrence_interval` executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringRule {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub description: String,
    pub process_id: i64,
    pub target_stage_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub priority: Priority,
    pub recurrence_interval: i64,
    pub execution_count: i64,
    pub cadence_value: i64,
    pub cadence_unit: CadenceUnit,
    pub is_active: bool,
    pub next_execution_date: Option<String>,
    pub last_executed_at: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl RecurringRule {
    pub fn is_exhausted(&self) -> bool {
        self.execution_count >= self.recurrence_interval
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecurringRule {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub process_id: i64,
    #[serde(default)]
    pub target_stage_id: Option<i64>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub recurrence_interval: i64,
    #[serde(default = "default_cadence_value")]
    pub cadence_value: i64,
    #[serde(default = "default_cadence_unit")]
    pub cadence_unit: CadenceUnit,
    #[serde(default)]
    pub created_by: Option<i64>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

fn default_cadence_value() -> i64 {
    1
}

fn default_cadence_unit() -> CadenceUnit {
    CadenceUnit::Days
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_status_roundtrip() {
        for s in &["active", "completed", "cancelled", "archived"] {
            let parsed: TicketStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("done".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_priority_roundtrip() {
        for s in &["low", "medium", "high", "urgent"] {
            let parsed: Priority = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_urgency_order() {
        let names: Vec<&str> = Priority::BY_URGENCY.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["urgent", "high", "medium", "low"]);
    }

    #[test]
    fn test_cadence_unit_roundtrip() {
        for s in &["hours", "days", "weeks", "months"] {
            let parsed: CadenceUnit = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("fortnights".parse::<CadenceUnit>().is_err());
    }

    #[test]
    fn test_serde_produces_snake_case_strings() {
        assert_eq!(
            serde_json::to_string(&NotificationType::RecurringTicket).unwrap(),
            "\"recurring_ticket\""
        );
        assert_eq!(
            serde_json::to_string(&AssignmentRole::Reviewer).unwrap(),
            "\"reviewer\""
        );
        assert_eq!(
            serde_json::from_str::<TicketStatus>("\"archived\"").unwrap(),
            TicketStatus::Archived
        );
    }

    #[test]
    fn test_new_rule_defaults() {
        let rule: NewRecurringRule = serde_json::from_value(serde_json::json!({
            "name": "Weekly backup check",
            "title": "Check backups",
            "process_id": 1,
            "recurrence_interval": 4
        }))
        .unwrap();
        assert_eq!(rule.priority, Priority::Medium);
        assert_eq!(rule.cadence_value, 1);
        assert_eq!(rule.cadence_unit, CadenceUnit::Days);
        assert!(rule.assignee_id.is_none());
        assert!(rule.description.is_empty());
    }

    #[test]
    fn test_rule_exhaustion() {
        let mut rule = RecurringRule {
            id: 1,
            name: "r".into(),
            title: "t".into(),
            description: String::new(),
            process_id: 1,
            target_stage_id: None,
            assignee_id: None,
            priority: Priority::Low,
            recurrence_interval: 2,
            execution_count: 1,
            cadence_value: 1,
            cadence_unit: CadenceUnit::Days,
            is_active: true,
            next_execution_date: None,
            last_executed_at: None,
            created_by: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(!rule.is_exhausted());
        rule.execution_count = 2;
        assert!(rule.is_exhausted());
    }
}
