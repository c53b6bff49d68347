use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use super::models::*;
use super::time::{DayBound, format_ts, normalize_input};
use crate::config::WorkflowConfig;
use crate::errors::DeskError;

/// Async-safe handle to the desk database.
///
/// Wraps `DeskDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DeskDb>>,
}

impl DbHandle {
    pub fn new(db: DeskDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// The closure picks the error type; it only has to absorb `DeskError`.
    pub async fn call<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&DeskDb) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<DeskError> + Send + 'static,
    {
        let db = self.inner.clone();
        match tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| DeskError::LockPoisoned)?;
            f(&guard)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => Err(DeskError::Other(anyhow::anyhow!("DB task panicked: {}", e)).into()),
        }
    }
}

pub struct DeskDb {
    conn: Connection,
}

impl DeskDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal mode")?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database");
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    full_name TEXT NOT NULL DEFAULT '',
                    email TEXT,
                    role TEXT NOT NULL DEFAULT 'agent',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS processes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS stages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    process_id INTEGER NOT NULL REFERENCES processes(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    order_index INTEGER NOT NULL,
                    is_initial INTEGER NOT NULL DEFAULT 0,
                    is_final INTEGER NOT NULL DEFAULT 0,
                    color TEXT
                );

                CREATE TABLE IF NOT EXISTS recurring_rules (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    process_id INTEGER NOT NULL REFERENCES processes(id),
                    target_stage_id INTEGER REFERENCES stages(id),
                    assignee_id INTEGER REFERENCES users(id),
                    priority TEXT NOT NULL DEFAULT 'medium',
                    recurrence_interval INTEGER NOT NULL CHECK (recurrence_interval >= 1),
                    execution_count INTEGER NOT NULL DEFAULT 0
                        CHECK (execution_count >= 0 AND execution_count <= recurrence_interval),
                    cadence_value INTEGER NOT NULL DEFAULT 1 CHECK (cadence_value >= 1),
                    cadence_unit TEXT NOT NULL DEFAULT 'days',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    next_execution_date TEXT,
                    last_executed_at TEXT,
                    created_by INTEGER REFERENCES users(id),
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_number TEXT NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    process_id INTEGER NOT NULL REFERENCES processes(id),
                    current_stage_id INTEGER NOT NULL REFERENCES stages(id),
                    assigned_to INTEGER REFERENCES users(id),
                    created_by INTEGER REFERENCES users(id),
                    recurring_rule_id INTEGER REFERENCES recurring_rules(id),
                    status TEXT NOT NULL DEFAULT 'active',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    due_date TEXT,
                    completed_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS ticket_assignments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    role TEXT NOT NULL DEFAULT 'assignee',
                    assigned_at TEXT NOT NULL,
                    UNIQUE(ticket_id, user_id, role)
                );

                CREATE TABLE IF NOT EXISTS ticket_stage_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    from_stage_id INTEGER REFERENCES stages(id),
                    to_stage_id INTEGER NOT NULL REFERENCES stages(id),
                    moved_by INTEGER REFERENCES users(id),
                    moved_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ticket_comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    title TEXT NOT NULL,
                    message TEXT NOT NULL DEFAULT '',
                    notification_type TEXT NOT NULL,
                    ticket_id INTEGER REFERENCES tickets(id) ON DELETE SET NULL,
                    is_read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sequences (
                    name TEXT PRIMARY KEY,
                    value INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_stages_process ON stages(process_id, order_index);
                CREATE INDEX IF NOT EXISTS idx_tickets_assigned ON tickets(assigned_to);
                CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created_at);
                CREATE INDEX IF NOT EXISTS idx_assignments_user ON ticket_assignments(user_id, role);
                CREATE INDEX IF NOT EXISTS idx_history_ticket ON ticket_stage_history(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_comments_ticket ON ticket_comments(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);
                CREATE INDEX IF NOT EXISTS idx_rules_due ON recurring_rules(is_active, next_execution_date);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction that takes the write lock immediately, so no
    /// other connection can read-then-write the same rows in between.
    pub fn immediate_transaction(&self) -> Result<Transaction<'_>> {
        // The DbHandle mutex already serializes use of this connection.
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .context("Failed to begin immediate transaction")
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let username = new.username.trim();
        if username.is_empty() {
            return Err(DeskError::validation("username must not be empty").into());
        }
        let taken: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .context("Failed to check username")?;
        if taken {
            return Err(
                DeskError::validation(format!("username '{}' is already taken", username)).into(),
            );
        }
        self.conn
            .execute(
                "INSERT INTO users (username, full_name, email, role) VALUES (?1, ?2, ?3, ?4)",
                params![username, new.full_name, new.email, new.role.as_str()],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        fetch_user(&self.conn, id)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], UserRow::from_row)
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?.into_user()?);
        }
        Ok(users)
    }

    // ── Processes & stages ────────────────────────────────────────────

    pub fn create_process(&self, new: &NewProcess, workflow: &WorkflowConfig) -> Result<ProcessDetail> {
        if new.name.trim().is_empty() {
            return Err(DeskError::validation("process name must not be empty").into());
        }
        validate_stage_layout(&new.stages, workflow)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO processes (name, description) VALUES (?1, ?2)",
            params![new.name.trim(), new.description],
        )
        .context("Failed to insert process")?;
        let process_id = tx.last_insert_rowid();
        for stage in &new.stages {
            insert_stage(&tx, process_id, stage)?;
        }
        tx.commit().context("Failed to commit process")?;

        tracing::info!(process_id, stages = new.stages.len(), "created process");
        self.get_process(process_id)?
            .context("Process not found after insert")
    }

    pub fn get_process(&self, id: i64) -> Result<Option<ProcessDetail>> {
        let process = self
            .conn
            .query_row(
                "SELECT id, name, description, created_at FROM processes WHERE id = ?1",
                params![id],
                process_from_row,
            )
            .optional()
            .context("Failed to query process")?;
        match process {
            Some(process) => {
                let stages = self.list_stages(process.id)?;
                Ok(Some(ProcessDetail { process, stages }))
            }
            None => Ok(None),
        }
    }

    pub fn list_processes(&self) -> Result<Vec<Process>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM processes ORDER BY name, id")
            .context("Failed to prepare list_processes")?;
        let rows = stmt
            .query_map([], process_from_row)
            .context("Failed to query processes")?;
        let mut processes = Vec::new();
        for row in rows {
            processes.push(row.context("Failed to read process row")?);
        }
        Ok(processes)
    }

    pub fn list_stages(&self, process_id: i64) -> Result<Vec<Stage>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {STAGE_COLUMNS} FROM stages WHERE process_id = ?1 ORDER BY order_index, id"
            ))
            .context("Failed to prepare list_stages")?;
        let rows = stmt
            .query_map(params![process_id], stage_from_row)
            .context("Failed to query stages")?;
        let mut stages = Vec::new();
        for row in rows {
            stages.push(row.context("Failed to read stage row")?);
        }
        Ok(stages)
    }

    /// Append a stage; the combined layout is re-validated first.
    pub fn add_stage(&self, process_id: i64, stage: &NewStage, workflow: &WorkflowConfig) -> Result<Stage> {
        let existing = match self.get_process(process_id)? {
            Some(detail) => detail.stages,
            None => return Err(DeskError::ProcessNotFound { id: process_id }.into()),
        };
        let mut combined: Vec<NewStage> = existing
            .iter()
            .map(|s| NewStage {
                name: s.name.clone(),
                order_index: s.order_index,
                is_initial: s.is_initial,
                is_final: s.is_final,
                color: s.color.clone(),
            })
            .collect();
        combined.push(stage.clone());
        validate_stage_layout(&combined, workflow)?;

        let id = insert_stage(&self.conn, process_id, stage)?;
        fetch_stage(&self.conn, id)?.context("Stage not found after insert")
    }

    // ── Tickets ───────────────────────────────────────────────────────

    pub fn create_ticket(&self, new: &NewTicket) -> Result<Ticket> {
        self.create_ticket_at(new, Utc::now())
    }

    pub fn create_ticket_at(&self, new: &NewTicket, now: DateTime<Utc>) -> Result<Ticket> {
        if new.title.trim().is_empty() {
            return Err(DeskError::validation("ticket title must not be empty").into());
        }
        if !process_exists(&self.conn, new.process_id)? {
            return Err(DeskError::ProcessNotFound { id: new.process_id }.into());
        }
        for user_id in [new.assigned_to, new.created_by].into_iter().flatten() {
            if fetch_user(&self.conn, user_id)?.is_none() {
                return Err(DeskError::UserNotFound { id: user_id }.into());
            }
        }
        let mut new = new.clone();
        new.due_date = match new.due_date.as_deref() {
            Some(raw) => Some(normalize_input(raw, DayBound::End)?),
            None => None,
        };
        let now = format_ts(now);

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let stage = resolve_stage(&tx, new.process_id, new.stage_id)?;
        let ticket = insert_ticket(&tx, &new, &stage, &now)?;
        insert_history(&tx, ticket.id, None, stage.id, new.created_by, &now)?;
        if let Some(assignee) = ticket.assigned_to {
            insert_assignment(&tx, ticket.id, assignee, AssignmentRole::Assignee, &now)?;
            insert_notification(
                &tx,
                &NewNotification {
                    user_id: assignee,
                    title: "New ticket assigned".to_string(),
                    message: format!("{}: {}", ticket.ticket_number, ticket.title),
                    notification_type: NotificationType::TicketCreated,
                    ticket_id: Some(ticket.id),
                },
                &now,
            )?;
        }
        tx.commit().context("Failed to commit ticket")?;

        tracing::info!(ticket_id = ticket.id, ticket_number = %ticket.ticket_number, "created ticket");
        Ok(ticket)
    }

    pub fn get_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        fetch_ticket(&self.conn, id)
    }

    pub fn get_ticket_detail(&self, id: i64) -> Result<Option<TicketDetail>> {
        let ticket = match fetch_ticket(&self.conn, id)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let stage = fetch_stage(&self.conn, ticket.current_stage_id)?
            .context("Ticket stage missing")?;
        let assignments = self.list_assignments(id)?;
        let history = self.list_history(id)?;
        Ok(Some(TicketDetail {
            ticket,
            stage,
            assignments,
            history,
        }))
    }

    /// Soft delete. Returns false if the ticket was missing or already deleted.
    pub fn delete_ticket(&self, id: i64) -> Result<bool> {
        let now = format_ts(Utc::now());
        let count = self
            .conn
            .execute(
                "UPDATE tickets SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![now, id],
            )
            .context("Failed to delete ticket")?;
        Ok(count > 0)
    }

    pub fn move_ticket(&self, id: i64, to_stage_id: i64, moved_by: Option<i64>) -> Result<Ticket> {
        self.move_ticket_at(id, to_stage_id, moved_by, Utc::now())
    }

    /// Move a ticket to another stage of its own process. Entering a final
    /// stage completes the ticket; leaving one reopens a completed ticket.
    pub fn move_ticket_at(
        &self,
        id: i64,
        to_stage_id: i64,
        moved_by: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Ticket> {
        let ticket = fetch_ticket(&self.conn, id)?.ok_or(DeskError::TicketNotFound { id })?;
        let stage =
            fetch_stage(&self.conn, to_stage_id)?.ok_or(DeskError::StageNotFound { id: to_stage_id })?;
        if stage.process_id != ticket.process_id {
            return Err(DeskError::validation(format!(
                "stage {} does not belong to process {}",
                stage.id, ticket.process_id
            ))
            .into());
        }
        let now = format_ts(now);

        let (status, completed_at) = if stage.is_final {
            (
                TicketStatus::Completed,
                ticket.completed_at.clone().or_else(|| Some(now.clone())),
            )
        } else if ticket.status == TicketStatus::Completed {
            (TicketStatus::Active, None)
        } else {
            (ticket.status, ticket.completed_at.clone())
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE tickets SET current_stage_id = ?1, status = ?2, completed_at = ?3, updated_at = ?4
             WHERE id = ?5",
            params![stage.id, status.as_str(), completed_at, now, id],
        )
        .context("Failed to move ticket")?;
        insert_history(&tx, id, Some(ticket.current_stage_id), stage.id, moved_by, &now)?;
        tx.commit().context("Failed to commit ticket move")?;

        tracing::debug!(ticket_id = id, from = ticket.current_stage_id, to = stage.id, "moved ticket");
        fetch_ticket(&self.conn, id)?.context("Ticket not found after move")
    }

    pub fn update_ticket_status(&self, id: i64, status: TicketStatus) -> Result<Ticket> {
        self.update_ticket_status_at(id, status, Utc::now())
    }

    pub fn update_ticket_status_at(
        &self,
        id: i64,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> Result<Ticket> {
        let now = format_ts(now);
        let count = self
            .conn
            .execute(
                "UPDATE tickets SET status = ?1,
                    completed_at = CASE WHEN ?1 = 'completed' THEN COALESCE(completed_at, ?2) ELSE NULL END,
                    updated_at = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![status.as_str(), now, id],
            )
            .context("Failed to update ticket status")?;
        if count == 0 {
            return Err(DeskError::TicketNotFound { id }.into());
        }
        fetch_ticket(&self.conn, id)?.context("Ticket not found after status update")
    }

    pub fn list_history(&self, ticket_id: i64) -> Result<Vec<StageTransition>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, ticket_id, from_stage_id, to_stage_id, moved_by, moved_at
                 FROM ticket_stage_history WHERE ticket_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_history")?;
        let rows = stmt
            .query_map(params![ticket_id], |row| {
                Ok(StageTransition {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    from_stage_id: row.get(2)?,
                    to_stage_id: row.get(3)?,
                    moved_by: row.get(4)?,
                    moved_at: row.get(5)?,
                })
            })
            .context("Failed to query stage history")?;
        let mut history = Vec::new();
        for row in rows {
            history.push(row.context("Failed to read history row")?);
        }
        Ok(history)
    }

    // ── Assignments ───────────────────────────────────────────────────

    /// Link a user to a ticket. Assignees also become the ticket's owner.
    pub fn assign_user(&self, ticket_id: i64, user_id: i64, role: AssignmentRole) -> Result<Assignment> {
        let ticket =
            fetch_ticket(&self.conn, ticket_id)?.ok_or(DeskError::TicketNotFound { id: ticket_id })?;
        if fetch_user(&self.conn, user_id)?.is_none() {
            return Err(DeskError::UserNotFound { id: user_id }.into());
        }
        let exists: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM ticket_assignments WHERE ticket_id = ?1 AND user_id = ?2 AND role = ?3",
                params![ticket_id, user_id, role.as_str()],
                |row| row.get(0),
            )
            .context("Failed to check assignment")?;
        if exists {
            return Err(DeskError::validation(format!(
                "user {} is already {} on ticket {}",
                user_id,
                role.as_str(),
                ticket_id
            ))
            .into());
        }
        let now = format_ts(Utc::now());

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let assignment = insert_assignment(&tx, ticket_id, user_id, role, &now)?;
        let (title, notification_type) = match role {
            AssignmentRole::Assignee => {
                tx.execute(
                    "UPDATE tickets SET assigned_to = ?1, updated_at = ?2 WHERE id = ?3",
                    params![user_id, now, ticket_id],
                )
                .context("Failed to set ticket owner")?;
                ("Ticket assigned to you", NotificationType::TicketAssigned)
            }
            AssignmentRole::Reviewer => ("Review requested", NotificationType::ReviewRequested),
        };
        insert_notification(
            &tx,
            &NewNotification {
                user_id,
                title: title.to_string(),
                message: format!("{}: {}", ticket.ticket_number, ticket.title),
                notification_type,
                ticket_id: Some(ticket_id),
            },
            &now,
        )?;
        tx.commit().context("Failed to commit assignment")?;
        Ok(assignment)
    }

    pub fn list_assignments(&self, ticket_id: i64) -> Result<Vec<Assignment>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM ticket_assignments WHERE ticket_id = ?1 ORDER BY id"
            ))
            .context("Failed to prepare list_assignments")?;
        let rows = stmt
            .query_map(params![ticket_id], AssignmentRow::from_row)
            .context("Failed to query assignments")?;
        let mut assignments = Vec::new();
        for row in rows {
            assignments.push(row.context("Failed to read assignment row")?.into_assignment()?);
        }
        Ok(assignments)
    }

    // ── Comments ──────────────────────────────────────────────────────

    pub fn add_comment(&self, ticket_id: i64, user_id: i64, content: &str) -> Result<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DeskError::validation("comment must not be empty").into());
        }
        let ticket =
            fetch_ticket(&self.conn, ticket_id)?.ok_or(DeskError::TicketNotFound { id: ticket_id })?;
        if fetch_user(&self.conn, user_id)?.is_none() {
            return Err(DeskError::UserNotFound { id: user_id }.into());
        }
        let now = format_ts(Utc::now());

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO ticket_comments (ticket_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![ticket_id, user_id, content, now],
        )
        .context("Failed to insert comment")?;
        let comment = Comment {
            id: tx.last_insert_rowid(),
            ticket_id,
            user_id,
            content: content.to_string(),
            created_at: now.clone(),
        };
        if let Some(owner) = ticket.assigned_to.filter(|owner| *owner != user_id) {
            insert_notification(
                &tx,
                &NewNotification {
                    user_id: owner,
                    title: "New comment".to_string(),
                    message: format!("New comment on {}", ticket.ticket_number),
                    notification_type: NotificationType::CommentAdded,
                    ticket_id: Some(ticket_id),
                },
                &now,
            )?;
        }
        tx.commit().context("Failed to commit comment")?;
        Ok(comment)
    }

    pub fn list_comments(&self, ticket_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, ticket_id, user_id, content, created_at
                 FROM ticket_comments WHERE ticket_id = ?1 ORDER BY created_at, id",
            )
            .context("Failed to prepare list_comments")?;
        let rows = stmt
            .query_map(params![ticket_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    user_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query comments")?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row.context("Failed to read comment row")?);
        }
        Ok(comments)
    }

    // ── Notifications ─────────────────────────────────────────────────

    pub fn list_notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, id DESC"
            ))
            .context("Failed to prepare list_notifications")?;
        let rows = stmt
            .query_map(params![user_id, unread_only], NotificationRow::from_row)
            .context("Failed to query notifications")?;
        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row.context("Failed to read notification row")?.into_notification()?);
        }
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, id: i64) -> Result<Notification> {
        let count = self
            .conn
            .execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", params![id])
            .context("Failed to mark notification read")?;
        if count == 0 {
            return Err(DeskError::NotificationNotFound { id }.into());
        }
        fetch_notification(&self.conn, id)?.context("Notification not found after update")
    }

    /// Returns how many notifications flipped to read.
    pub fn mark_all_notifications_read(&self, user_id: i64) -> Result<usize> {
        self.conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                params![user_id],
            )
            .context("Failed to mark notifications read")
    }

    // ── Recurring rules ───────────────────────────────────────────────

    pub fn create_rule(&self, new: &NewRecurringRule) -> Result<RecurringRule> {
        self.create_rule_at(new, Utc::now())
    }

    /// Insert a rule whose first tick is due at `now`.
    pub fn create_rule_at(&self, new: &NewRecurringRule, now: DateTime<Utc>) -> Result<RecurringRule> {
        if new.name.trim().is_empty() {
            return Err(DeskError::validation("rule name must not be empty").into());
        }
        if new.title.trim().is_empty() {
            return Err(DeskError::validation("rule title must not be empty").into());
        }
        if new.recurrence_interval < 1 {
            return Err(DeskError::validation("recurrence_interval must be at least 1").into());
        }
        if new.cadence_value < 1 {
            return Err(DeskError::validation("cadence_value must be at least 1").into());
        }
        if !process_exists(&self.conn, new.process_id)? {
            return Err(DeskError::ProcessNotFound { id: new.process_id }.into());
        }
        if let Some(stage_id) = new.target_stage_id {
            let stage =
                fetch_stage(&self.conn, stage_id)?.ok_or(DeskError::StageNotFound { id: stage_id })?;
            if stage.process_id != new.process_id {
                return Err(DeskError::validation(format!(
                    "target stage {} does not belong to process {}",
                    stage_id, new.process_id
                ))
                .into());
            }
        }
        for user_id in [new.assignee_id, new.created_by].into_iter().flatten() {
            if fetch_user(&self.conn, user_id)?.is_none() {
                return Err(DeskError::UserNotFound { id: user_id }.into());
            }
        }
        let now = format_ts(now);

        self.conn
            .execute(
                "INSERT INTO recurring_rules
                    (name, title, description, process_id, target_stage_id, assignee_id, priority,
                     recurrence_interval, cadence_value, cadence_unit, next_execution_date,
                     created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?11, ?11)",
                params![
                    new.name.trim(),
                    new.title.trim(),
                    new.description,
                    new.process_id,
                    new.target_stage_id,
                    new.assignee_id,
                    new.priority.as_str(),
                    new.recurrence_interval,
                    new.cadence_value,
                    new.cadence_unit.as_str(),
                    now,
                    new.created_by,
                ],
            )
            .context("Failed to insert recurring rule")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(rule_id = id, "created recurring rule");
        self.get_rule(id)?.context("Rule not found after insert")
    }

    pub fn get_rule(&self, id: i64) -> Result<Option<RecurringRule>> {
        fetch_rule(&self.conn, id)
    }

    pub fn list_rules(&self) -> Result<Vec<RecurringRule>> {
        self.query_rules(&format!("SELECT {RULE_COLUMNS} FROM recurring_rules ORDER BY id"), [])
    }

    /// Active rules whose next tick is at or before `now`, oldest first.
    pub fn list_due_rules(&self, now: DateTime<Utc>) -> Result<Vec<RecurringRule>> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM recurring_rules
                 WHERE is_active = 1 AND next_execution_date IS NOT NULL AND next_execution_date <= ?1
                 ORDER BY next_execution_date, id"
            ),
            params![format_ts(now)],
        )
    }

    fn query_rules<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<RecurringRule>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare rule query")?;
        let rows = stmt
            .query_map(params, RuleRow::from_row)
            .context("Failed to query recurring rules")?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row.context("Failed to read rule row")?.into_rule()?);
        }
        Ok(rules)
    }

    /// Stop a rule from firing again. Rules are never hard-deleted.
    pub fn deactivate_rule(&self, id: i64) -> Result<RecurringRule> {
        let count = self
            .conn
            .execute(
                "UPDATE recurring_rules SET is_active = 0, next_execution_date = NULL, updated_at = ?1
                 WHERE id = ?2",
                params![format_ts(Utc::now()), id],
            )
            .context("Failed to deactivate rule")?;
        if count == 0 {
            return Err(DeskError::RuleNotFound { id }.into());
        }
        self.get_rule(id)?.context("Rule not found after deactivate")
    }
}

/// Check a process's stage layout against the configured workflow rules.
pub fn validate_stage_layout(stages: &[NewStage], workflow: &WorkflowConfig) -> Result<(), DeskError> {
    if stages.is_empty() {
        return Err(DeskError::validation("a process needs at least one stage"));
    }
    let mut names = HashSet::new();
    let mut orders = HashSet::new();
    for stage in stages {
        let name = stage.name.trim();
        if name.is_empty() {
            return Err(DeskError::validation("stage names must not be empty"));
        }
        if !names.insert(name) {
            return Err(DeskError::validation(format!("duplicate stage name '{}'", name)));
        }
        if !orders.insert(stage.order_index) {
            return Err(DeskError::validation(format!(
                "duplicate order_index {}",
                stage.order_index
            )));
        }
        if stage.is_initial && stage.is_final && stages.len() > 1 {
            return Err(DeskError::validation(format!(
                "stage '{}' cannot be both initial and final",
                name
            )));
        }
    }

    let initial = stages.iter().filter(|s| s.is_initial).count();
    let finals = stages.iter().filter(|s| s.is_final).count();
    if workflow.require_initial_stage && initial != 1 {
        return Err(DeskError::validation(format!(
            "exactly one initial stage is required, found {}",
            initial
        )));
    }
    if initial > 1 {
        return Err(DeskError::validation("at most one initial stage is allowed"));
    }
    if workflow.require_final_stage && finals == 0 {
        return Err(DeskError::validation("at least one final stage is required"));
    }
    if !workflow.allow_multiple_final_stages && finals > 1 {
        return Err(DeskError::validation(format!(
            "only one final stage is allowed, found {}",
            finals
        )));
    }
    Ok(())
}

// ── Row helpers shared with the recurrence engine ─────────────────────
//
// These take `&Connection` so they run equally on the plain connection or
// inside a `Transaction`.

const USER_COLUMNS: &str = "id, username, full_name, email, role, is_active, created_at";
const STAGE_COLUMNS: &str = "id, process_id, name, order_index, is_initial, is_final, color";
const TICKET_COLUMNS: &str = "id, ticket_number, title, description, process_id, current_stage_id, \
     assigned_to, created_by, recurring_rule_id, status, priority, due_date, completed_at, \
     created_at, updated_at";
const ASSIGNMENT_COLUMNS: &str = "id, ticket_id, user_id, role, assigned_at";
const NOTIFICATION_COLUMNS: &str =
    "id, user_id, title, message, notification_type, ticket_id, is_read, created_at";
const RULE_COLUMNS: &str = "id, name, title, description, process_id, target_stage_id, assignee_id, \
     priority, recurrence_interval, execution_count, cadence_value, cadence_unit, is_active, \
     next_execution_date, last_executed_at, created_by, created_at, updated_at";

pub(crate) fn fetch_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            UserRow::from_row,
        )
        .optional()
        .context("Failed to query user")?;
    row.map(UserRow::into_user).transpose()
}

pub(crate) fn fetch_stage(conn: &Connection, id: i64) -> Result<Option<Stage>> {
    conn.query_row(
        &format!("SELECT {STAGE_COLUMNS} FROM stages WHERE id = ?1"),
        params![id],
        stage_from_row,
    )
    .optional()
    .context("Failed to query stage")
}

pub(crate) fn fetch_ticket(conn: &Connection, id: i64) -> Result<Option<Ticket>> {
    let row = conn
        .query_row(
            &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1 AND deleted_at IS NULL"),
            params![id],
            TicketRow::from_row,
        )
        .optional()
        .context("Failed to query ticket")?;
    row.map(TicketRow::into_ticket).transpose()
}

pub(crate) fn fetch_rule(conn: &Connection, id: i64) -> Result<Option<RecurringRule>> {
    let row = conn
        .query_row(
            &format!("SELECT {RULE_COLUMNS} FROM recurring_rules WHERE id = ?1"),
            params![id],
            RuleRow::from_row,
        )
        .optional()
        .context("Failed to query recurring rule")?;
    row.map(RuleRow::into_rule).transpose()
}

fn fetch_notification(conn: &Connection, id: i64) -> Result<Option<Notification>> {
    let row = conn
        .query_row(
            &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
            params![id],
            NotificationRow::from_row,
        )
        .optional()
        .context("Failed to query notification")?;
    row.map(NotificationRow::into_notification).transpose()
}

fn process_exists(conn: &Connection, id: i64) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM processes WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .context("Failed to check process")
}

fn insert_stage(conn: &Connection, process_id: i64, stage: &NewStage) -> Result<i64> {
    conn.execute(
        "INSERT INTO stages (process_id, name, order_index, is_initial, is_final, color)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            process_id,
            stage.name.trim(),
            stage.order_index,
            stage.is_initial,
            stage.is_final,
            stage.color
        ],
    )
    .context("Failed to insert stage")?;
    Ok(conn.last_insert_rowid())
}

/// Pick the stage a new ticket starts in: the preferred stage if it belongs
/// to the process, else the initial stage, else the lowest-ordered one.
pub(crate) fn resolve_stage(conn: &Connection, process_id: i64, preferred: Option<i64>) -> Result<Stage> {
    if let Some(stage_id) = preferred {
        let stage = fetch_stage(conn, stage_id)?.ok_or(DeskError::StageNotFound { id: stage_id })?;
        if stage.process_id != process_id {
            return Err(DeskError::validation(format!(
                "stage {} does not belong to process {}",
                stage_id, process_id
            ))
            .into());
        }
        return Ok(stage);
    }
    let stage = conn
        .query_row(
            &format!(
                "SELECT {STAGE_COLUMNS} FROM stages WHERE process_id = ?1
                 ORDER BY is_initial DESC, order_index, id LIMIT 1"
            ),
            params![process_id],
            stage_from_row,
        )
        .optional()
        .context("Failed to resolve stage")?;
    stage.ok_or_else(|| {
        DeskError::validation(format!("process {} has no stages", process_id)).into()
    })
}

/// Draw the next ticket number from the `sequences` row. Must run inside
/// the caller's transaction.
pub(crate) fn next_ticket_number(conn: &Connection) -> Result<String> {
    let value: i64 = conn
        .query_row(
            "INSERT INTO sequences (name, value) VALUES ('ticket', 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1
             RETURNING value",
            [],
            |row| row.get(0),
        )
        .context("Failed to advance ticket sequence")?;
    Ok(format!("TKT-{:06}", value))
}

pub(crate) fn insert_ticket(conn: &Connection, new: &NewTicket, stage: &Stage, now: &str) -> Result<Ticket> {
    let number = next_ticket_number(conn)?;
    conn.execute(
        "INSERT INTO tickets
            (ticket_number, title, description, process_id, current_stage_id, assigned_to,
             created_by, recurring_rule_id, status, priority, due_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', ?9, ?10, ?11, ?11)",
        params![
            number,
            new.title.trim(),
            new.description,
            new.process_id,
            stage.id,
            new.assigned_to,
            new.created_by,
            new.recurring_rule_id,
            new.priority.as_str(),
            new.due_date,
            now,
        ],
    )
    .context("Failed to insert ticket")?;
    let id = conn.last_insert_rowid();
    fetch_ticket(conn, id)?.context("Ticket not found after insert")
}

pub(crate) fn insert_history(
    conn: &Connection,
    ticket_id: i64,
    from_stage_id: Option<i64>,
    to_stage_id: i64,
    moved_by: Option<i64>,
    now: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO ticket_stage_history (ticket_id, from_stage_id, to_stage_id, moved_by, moved_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![ticket_id, from_stage_id, to_stage_id, moved_by, now],
    )
    .context("Failed to record stage transition")?;
    Ok(())
}

pub(crate) fn insert_assignment(
    conn: &Connection,
    ticket_id: i64,
    user_id: i64,
    role: AssignmentRole,
    now: &str,
) -> Result<Assignment> {
    conn.execute(
        "INSERT INTO ticket_assignments (ticket_id, user_id, role, assigned_at) VALUES (?1, ?2, ?3, ?4)",
        params![ticket_id, user_id, role.as_str(), now],
    )
    .context("Failed to insert assignment")?;
    Ok(Assignment {
        id: conn.last_insert_rowid(),
        ticket_id,
        user_id,
        role,
        assigned_at: now.to_string(),
    })
}

pub(crate) fn insert_notification(conn: &Connection, new: &NewNotification, now: &str) -> Result<Notification> {
    conn.execute(
        "INSERT INTO notifications (user_id, title, message, notification_type, ticket_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.user_id,
            new.title,
            new.message,
            new.notification_type.as_str(),
            new.ticket_id,
            now
        ],
    )
    .context("Failed to insert notification")?;
    Ok(Notification {
        id: conn.last_insert_rowid(),
        user_id: new.user_id,
        title: new.title.clone(),
        message: new.message.clone(),
        notification_type: new.notification_type,
        ticket_id: new.ticket_id,
        is_read: false,
        created_at: now.to_string(),
    })
}

fn parse_enum<T>(raw: &str, what: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    T::from_str(raw)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to parse {}", what))
}

fn process_from_row(row: &Row<'_>) -> rusqlite::Result<Process> {
    Ok(Process {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn stage_from_row(row: &Row<'_>) -> rusqlite::Result<Stage> {
    Ok(Stage {
        id: row.get(0)?,
        process_id: row.get(1)?,
        name: row.get(2)?,
        order_index: row.get(3)?,
        is_initial: row.get(4)?,
        is_final: row.get(5)?,
        color: row.get(6)?,
    })
}

struct UserRow {
    id: i64,
    username: String,
    full_name: String,
    email: Option<String>,
    role: String,
    is_active: bool,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            full_name: row.get(2)?,
            email: row.get(3)?,
            role: row.get(4)?,
            is_active: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id,
            username: self.username,
            full_name: self.full_name,
            email: self.email,
            role: parse_enum(&self.role, "user role")?,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

struct TicketRow {
    id: i64,
    ticket_number: String,
    title: String,
    description: String,
    process_id: i64,
    current_stage_id: i64,
    assigned_to: Option<i64>,
    created_by: Option<i64>,
    recurring_rule_id: Option<i64>,
    status: String,
    priority: String,
    due_date: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TicketRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticket_number: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            process_id: row.get(4)?,
            current_stage_id: row.get(5)?,
            assigned_to: row.get(6)?,
            created_by: row.get(7)?,
            recurring_rule_id: row.get(8)?,
            status: row.get(9)?,
            priority: row.get(10)?,
            due_date: row.get(11)?,
            completed_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: self.id,
            ticket_number: self.ticket_number,
            title: self.title,
            description: self.description,
            process_id: self.process_id,
            current_stage_id: self.current_stage_id,
            assigned_to: self.assigned_to,
            created_by: self.created_by,
            recurring_rule_id: self.recurring_rule_id,
            status: parse_enum(&self.status, "ticket status")?,
            priority: parse_enum(&self.priority, "ticket priority")?,
            due_date: self.due_date,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct AssignmentRow {
    id: i64,
    ticket_id: i64,
    user_id: i64,
    role: String,
    assigned_at: String,
}

impl AssignmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            user_id: row.get(2)?,
            role: row.get(3)?,
            assigned_at: row.get(4)?,
        })
    }

    fn into_assignment(self) -> Result<Assignment> {
        Ok(Assignment {
            id: self.id,
            ticket_id: self.ticket_id,
            user_id: self.user_id,
            role: parse_enum(&self.role, "assignment role")?,
            assigned_at: self.assigned_at,
        })
    }
}

struct NotificationRow {
    id: i64,
    user_id: i64,
    title: String,
    message: String,
    notification_type: String,
    ticket_id: Option<i64>,
    is_read: bool,
    created_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            message: row.get(3)?,
            notification_type: row.get(4)?,
            ticket_id: row.get(5)?,
            is_read: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            notification_type: parse_enum(&self.notification_type, "notification type")?,
            ticket_id: self.ticket_id,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}

struct RuleRow {
    id: i64,
    name: String,
    title: String,
    description: String,
    process_id: i64,
    target_stage_id: Option<i64>,
    assignee_id: Option<i64>,
    priority: String,
    recurrence_interval: i64,
    execution_count: i64,
    cadence_value: i64,
    cadence_unit: String,
    is_active: bool,
    next_execution_date: Option<String>,
    last_executed_at: Option<String>,
    created_by: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl RuleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            process_id: row.get(4)?,
            target_stage_id: row.get(5)?,
            assignee_id: row.get(6)?,
            priority: row.get(7)?,
            recurrence_interval: row.get(8)?,
            execution_count: row.get(9)?,
            cadence_value: row.get(10)?,
            cadence_unit: row.get(11)?,
            is_active: row.get(12)?,
            next_execution_date: row.get(13)?,
            last_executed_at: row.get(14)?,
            created_by: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }

    fn into_rule(self) -> Result<RecurringRule> {
        Ok(RecurringRule {
            id: self.id,
            name: self.name,
            title: self.title,
            description: self.description,
            process_id: self.process_id,
            target_stage_id: self.target_stage_id,
            assignee_id: self.assignee_id,
            priority: parse_enum(&self.priority, "rule priority")?,
            recurrence_interval: self.recurrence_interval,
            execution_count: self.execution_count,
            cadence_value: self.cadence_value,
            cadence_unit: parse_enum(&self.cadence_unit, "cadence unit")?,
            is_active: self.is_active,
            next_execution_date: self.next_execution_date,
            last_executed_at: self.last_executed_at,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Shared fixtures for store-backed tests across the `desk` modules.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub struct Seed {
        pub db: DeskDb,
        pub agent: User,
        pub manager: User,
        pub process: ProcessDetail,
    }

    impl Seed {
        pub fn stage(&self, name: &str) -> &Stage {
            self.process
                .stages
                .iter()
                .find(|s| s.name == name)
                .expect("stage exists in fixture")
        }
    }

    pub fn user(db: &DeskDb, username: &str, role: UserRole) -> User {
        db.create_user(&NewUser {
            username: username.to_string(),
            full_name: username.to_uppercase(),
            email: None,
            role,
        })
        .unwrap()
    }

    pub fn stages(layout: &[(&str, i32, bool, bool)]) -> Vec<NewStage> {
        layout
            .iter()
            .map(|(name, order_index, is_initial, is_final)| NewStage {
                name: name.to_string(),
                order_index: *order_index,
                is_initial: *is_initial,
                is_final: *is_final,
                color: None,
            })
            .collect()
    }

    pub fn process(db: &DeskDb, name: &str) -> ProcessDetail {
        db.create_process(
            &NewProcess {
                name: name.to_string(),
                description: String::new(),
                stages: stages(&[
                    ("Todo", 0, true, false),
                    ("In Progress", 1, false, false),
                    ("Review", 2, false, false),
                    ("Done", 3, false, true),
                ]),
            },
            &WorkflowConfig::default(),
        )
        .unwrap()
    }

    /// A process with no stages, which the layout rules would reject.
    pub fn bare_process(db: &DeskDb, name: &str) -> i64 {
        db.conn()
            .execute("INSERT INTO processes (name) VALUES (?1)", params![name])
            .unwrap();
        db.conn().last_insert_rowid()
    }

    pub fn seed() -> Seed {
        let db = DeskDb::new_in_memory().unwrap();
        let agent = user(&db, "alice", UserRole::Agent);
        let manager = user(&db, "maria", UserRole::Manager);
        let process = process(&db, "Support");
        Seed {
            db,
            agent,
            manager,
            process,
        }
    }

    pub fn ticket(process_id: i64, title: &str) -> NewTicket {
        NewTicket {
            title: title.to_string(),
            description: String::new(),
            process_id,
            stage_id: None,
            assigned_to: None,
            created_by: None,
            recurring_rule_id: None,
            priority: Priority::Medium,
            due_date: None,
        }
    }

    pub fn rule(process_id: i64, assignee_id: Option<i64>, interval: i64) -> NewRecurringRule {
        NewRecurringRule {
            name: "Weekly server check".to_string(),
            title: "Check server health".to_string(),
            description: "Look at disk and memory".to_string(),
            process_id,
            target_stage_id: None,
            assignee_id,
            priority: Priority::High,
            recurrence_interval: interval,
            cadence_value: 1,
            cadence_unit: CadenceUnit::Weeks,
            created_by: None,
        }
    }
}
