//! Typed error hierarchy for flowdesk.
//!
//! `DeskError` is what the store, the recurrence engine and the report
//! builder return when a caller needs to tell failures apart. Plumbing code
//! uses `anyhow` and embeds a `DeskError` where the kind matters, so the API
//! layer can downcast and pick a status code.

use thiserror::Error;

/// Coarse classification used by the HTTP layer and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    Validation,
    Storage,
}

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("Recurring rule {id} not found")]
    RuleNotFound { id: i64 },

    #[error("User {id} not found")]
    UserNotFound { id: i64 },

    #[error("Ticket {id} not found")]
    TicketNotFound { id: i64 },

    #[error("Process {id} not found")]
    ProcessNotFound { id: i64 },

    #[error("Stage {id} not found")]
    StageNotFound { id: i64 },

    #[error("Notification {id} not found")]
    NotificationNotFound { id: i64 },

    #[error("Recurring rule {id} cannot be executed: {reason}")]
    RuleNotExecutable { id: i64, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to create ticket: {0:#}")]
    TicketCreationFailed(#[source] anyhow::Error),

    #[error("Database error: {0:#}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RuleNotFound { .. }
            | Self::UserNotFound { .. }
            | Self::TicketNotFound { .. }
            | Self::ProcessNotFound { .. }
            | Self::StageNotFound { .. }
            | Self::NotificationNotFound { .. } => ErrorKind::NotFound,
            Self::RuleNotExecutable { .. } => ErrorKind::PreconditionFailed,
            Self::Validation(_) => ErrorKind::Validation,
            Self::TicketCreationFailed(_)
            | Self::Database(_)
            | Self::LockPoisoned
            | Self::Other(_) => ErrorKind::Storage,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Recover a typed error from an `anyhow` chain, wrapping anything
    /// untyped as a database failure.
    pub fn from_storage(err: anyhow::Error) -> Self {
        match err.downcast::<DeskError>() {
            Ok(desk) => desk,
            Err(other) => Self::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_not_found_carries_id() {
        let err = DeskError::RuleNotFound { id: 42 };
        match &err {
            DeskError::RuleNotFound { id } => assert_eq!(*id, 42),
            _ => panic!("Expected RuleNotFound"),
        }
        assert!(err.to_string().contains("42"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rule_not_executable_is_precondition_failure() {
        let err = DeskError::RuleNotExecutable {
            id: 7,
            reason: "rule is inactive".into(),
        };
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(err.to_string().contains("rule is inactive"));
    }

    #[test]
    fn storage_variants_share_a_kind() {
        let errs = [
            DeskError::LockPoisoned,
            DeskError::Database(anyhow::anyhow!("disk I/O error")),
            DeskError::TicketCreationFailed(anyhow::anyhow!("no stages")),
            DeskError::Other(anyhow::anyhow!("boom")),
        ];
        for err in &errs {
            assert_eq!(err.kind(), ErrorKind::Storage, "{err}");
        }
    }

    #[test]
    fn from_storage_recovers_typed_error() {
        let wrapped: anyhow::Error = DeskError::TicketNotFound { id: 3 }.into();
        let recovered = DeskError::from_storage(wrapped);
        assert!(matches!(recovered, DeskError::TicketNotFound { id: 3 }));

        let untyped = DeskError::from_storage(anyhow::anyhow!("constraint failed"));
        assert!(matches!(untyped, DeskError::Database(_)));
    }

    #[test]
    fn validation_helper_builds_message() {
        let err = DeskError::validation("date_from is after date_to");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Validation failed: date_from is after date_to");
    }

    #[test]
    fn desk_error_implements_std_error() {
        fn assert_std_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
        assert_std_error(&DeskError::LockPoisoned);
    }
}
