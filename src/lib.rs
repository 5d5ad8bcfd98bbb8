//! Tallerbot - Telegram bot for booking workshop appointments
//!
//! A scripted conversation collects the customer's answers, asks for
//! confirmation and writes the booking to the job ledger in one transaction.
//! Staff follow up on jobs with a small set of allow-listed commands.
//!
//! # Module Structure
//!
//! - `flow`: flow document loading and the pure step engine
//! - `conversation`: session handling plus commit/cancel orchestration
//! - `storage`: SQLite pool, migrations, session stores and the job ledger
//! - `telegram`: command enum, dispatcher schema and staff commands
//! - `core`: configuration, errors and logging

pub mod cli;
pub mod conversation;
pub mod core;
pub mod flow;
pub mod i18n;
pub mod storage;
pub mod telegram;
pub mod testing;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use conversation::{commit_booking, CommitOutcome, Conversation, Sender};
pub use flow::{Flow, FlowError};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
