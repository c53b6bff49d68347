//! Notification delivery seam.
//!
//! The recurrence engine delivers after its transaction commits, so a
//! delivery failure can never undo a created ticket.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::db::{DeskDb, insert_notification};
use super::models::{NewNotification, Notification};
use super::time::format_ts;

pub trait Notifier: Send + Sync {
    /// `at` is the time of the event being announced.
    fn deliver(
        &self,
        db: &DeskDb,
        notification: &NewNotification,
        at: DateTime<Utc>,
    ) -> Result<Notification>;
}

/// Writes notifications into the `notifications` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreNotifier;

impl Notifier for StoreNotifier {
    fn deliver(
        &self,
        db: &DeskDb,
        notification: &NewNotification,
        at: DateTime<Utc>,
    ) -> Result<Notification> {
        let stored = insert_notification(db.conn(), notification, &format_ts(at))?;
        tracing::debug!(
            notification_id = stored.id,
            user_id = stored.user_id,
            kind = stored.notification_type.as_str(),
            "notification stored"
        );
        Ok(stored)
    }
}
