//! Pitch workflow: submission, review, team claims and issue bucketing.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState, Actor)  │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ WorkflowEngine::execute()              │
//!                       │         v                                        │
//!                       │  engine.rs  (per-pitch locks, revision checks)   │
//!                       │         │                                        │
//!                       │         │ PitchCommand::apply(&mut Pitch)        │
//!                       │         v                                        │
//!                       │  command.rs ─> lifecycle / claims / ledger /     │
//!                       │                capacity / issues                 │
//!                       │         │                                        │
//!                       │         │ PitchDb::save_pitch() (revision CAS)   │
//!                       │         v                                        │
//!                       │  db.rs  (SQLite via DbHandle)                    │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                            |
//! |-------------|-----------------------------------------------------------|
//! | `models`    | `Pitch` aggregate, status enums, staff inputs, views      |
//! | `lifecycle` | submit / approve / decline                                |
//! | `capacity`  | open seats per team, `is_fully_claimed`                   |
//! | `claims`    | claim queue (submit, decline, FIFO listing)               |
//! | `ledger`    | approved assignments, writer and editor slots             |
//! | `issues`    | per-issue production status and board bucketing          |
//! | `ws`        | change feed: `WsMessage`, per-subscriber `FeedFilter`     |
//!
//! Everything below `command` is pure: functions take `&mut Pitch`, validate
//! completely, and only then mutate. The engine is the only place that
//! touches storage.

pub mod api;
pub mod capacity;
pub mod claims;
pub mod command;
pub mod db;
pub mod engine;
pub mod issues;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod server;
pub mod ws;

use crate::errors::WorkflowError;

pub(crate) fn require_id(field: &str, value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() {
        return Err(WorkflowError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
