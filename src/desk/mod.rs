//! Ticket workflow desk: processes, tickets, recurring rules and reports.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  HTTP  ┌──────────────────────────────────────────────┐
//! │  Client  │ ─────> │  server.rs  (axum Router, ServerConfig)      │
//! └──────────┘        │    └─ api.rs  (handlers, ApiError, AppState) │
//!                     │         │                                    │
//!                     │         ├─ recurrence.rs  (execute_rule)     │
//!                     │         │     └─ notify.rs  (Notifier)       │
//!                     │         ├─ report.rs  (build_user_report)    │
//!                     │         v                                    │
//!                     │  db.rs  (DeskDb, DbHandle, SQLite schema)    │
//!                     │  models.rs / time.rs                         │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! All SQLite access goes through [`db::DbHandle`] from async code; the
//! store itself is synchronous and is what the CLI uses directly.

pub mod api;
pub mod db;
pub mod models;
pub mod notify;
pub mod recurrence;
pub mod report;
pub mod server;
pub mod time;
