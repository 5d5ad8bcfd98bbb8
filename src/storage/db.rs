use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::core::error::AppResult;
use crate::storage::migrations::run_migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and applies the
/// embedded migrations on the first connection. A failed migration is fatal:
/// the booking flow cannot run against an outdated schema.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
///
/// # Example
///
/// ```no_run
/// use tallerbot::storage::create_pool;
///
/// let pool = create_pool("tallerbot.sqlite")?;
/// # Ok::<(), tallerbot::core::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    // Writers wait for the booking transaction instead of failing with SQLITE_BUSY
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(10)));
    let pool = Pool::builder().max_size(10).build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

/// SQLite library version, reported by `check-db`.
pub fn sqlite_version(conn: &rusqlite::Connection) -> AppResult<String> {
    Ok(conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?)
}
