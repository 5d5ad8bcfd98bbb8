//! Database, session and job ledger storage

pub mod db;
pub mod jobs;
pub mod migrations;
pub mod sessions;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use jobs::{JobLedger, LedgerTransaction, SqliteJobLedger};
pub use sessions::{MemorySessionStore, SessionStore, SqliteSessionStore};
