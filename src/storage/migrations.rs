use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use rusqlite::Connection;

use crate::core::error::AppResult;

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

static MIGRATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Applies pending embedded migrations.
///
/// refinery wraps each migration in its own transaction, so no outer
/// transaction is opened here. Runs are serialized per process.
pub fn run_migrations(conn: &mut Connection) -> AppResult<()> {
    let mutex = MIGRATION_LOCK.get_or_init(|| Mutex::new(()));
    // Migrations are idempotent, a poisoned lock is safe to reuse
    let _guard = match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Migration lock was poisoned, recovering...");
            poisoned.into_inner()
        }
    };

    conn.busy_timeout(Duration::from_secs(30))?;

    let report = embedded::migrations::runner().run(conn)?;
    for migration in report.applied_migrations() {
        log::info!("Applied migration {}", migration);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_tables_and_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();

        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'refinery%' AND name NOT LIKE 'sqlite%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["job_events", "job_id_sequence", "jobs", "sessions"]);

        let sequence: i64 = conn
            .query_row("SELECT value FROM job_id_sequence WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sequence, 0);
    }
}
