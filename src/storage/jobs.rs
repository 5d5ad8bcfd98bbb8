//! Job ledger: jobs and their append-only event trail
//!
//! A booking is written as two rows in one transaction: first a
//! `JOB_SCHEDULED` event carrying the collected answers, then the job row with
//! the same id. Staff updates follow the same rule (event + update, one
//! transaction).

use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::core::error::AppResult;
use crate::flow::FlowData;
use crate::storage::db::{get_connection, DbConnection, DbPool};

/// Field names the booking flow stores answers under.
pub mod fields {
    pub const CUSTOMER_NAME: &str = "customer_name";
    pub const CUSTOMER_PHONE: &str = "customer_phone";
    pub const VEHICLE_MAKE_MODEL: &str = "vehicle_make_model";
    pub const PROBLEM_DESCRIPTION: &str = "problem_description";
    pub const SCHEDULED_DATE: &str = "scheduled_date";
}

/// Workshop job lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Lead,
    Agendado,
    EnRevision,
    EnReparacion,
    ListoParaEntrega,
    Completado,
}

/// Kinds of rows in `job_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobEventType {
    JobScheduled,
    StatusChanged,
    ProgressUpdated,
    NotesUpdated,
}

/// A row of the `jobs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: i64,
    pub telegram_user_id: i64,
    pub telegram_chat_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub vehicle_make_model: Option<String>,
    pub problem_description: Option<String>,
    pub scheduled_date: Option<String>,
    pub current_status: JobStatus,
    pub progress_percentage: u8,
    pub internal_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row of the `job_events` table.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub event_id: i64,
    pub job_id: i64,
    pub event_type: JobEventType,
    pub payload: JsonValue,
    pub created_at: String,
}

/// Fields for a job about to be inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewJob {
    /// Taken from the sequence when `None`.
    pub job_id: Option<i64>,
    pub telegram_user_id: i64,
    pub telegram_chat_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub vehicle_make_model: Option<String>,
    pub problem_description: Option<String>,
    pub scheduled_date: Option<String>,
    pub current_status: JobStatus,
}

impl NewJob {
    /// Maps collected answers onto job columns; absent answers stay `None`.
    pub fn from_flow_data(job_id: i64, telegram_user_id: i64, telegram_chat_id: i64, data: &FlowData) -> Self {
        let field = |name: &str| data.get(name).cloned();
        Self {
            job_id: Some(job_id),
            telegram_user_id,
            telegram_chat_id,
            customer_name: field(fields::CUSTOMER_NAME),
            customer_phone: field(fields::CUSTOMER_PHONE),
            vehicle_make_model: field(fields::VEHICLE_MAKE_MODEL),
            problem_description: field(fields::PROBLEM_DESCRIPTION),
            scheduled_date: field(fields::SCHEDULED_DATE),
            current_status: JobStatus::default(),
        }
    }
}

/// Filter for `list_jobs`; every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub telegram_user_id: Option<i64>,
    pub telegram_chat_id: Option<i64>,
    pub limit: Option<usize>,
}

/// One open ledger transaction.
///
/// Calls happen in program order on a single connection. Dropping a
/// transaction that was neither committed nor rolled back rolls it back.
pub trait LedgerTransaction {
    /// Next value of the job id sequence.
    fn next_job_id(&mut self) -> AppResult<i64>;

    fn create_job_event(&mut self, job_id: i64, event_type: JobEventType, payload: &JsonValue) -> AppResult<JobEvent>;

    fn create_job(&mut self, job: &NewJob) -> AppResult<Job>;

    fn commit(self: Box<Self>) -> AppResult<()>;

    fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Transactional store of jobs and job events.
pub trait JobLedger: Send + Sync {
    fn begin(&self) -> AppResult<Box<dyn LedgerTransaction + '_>>;
}

/// SQLite ledger over the shared pool.
pub struct SqliteJobLedger {
    pool: Arc<DbPool>,
}

impl SqliteJobLedger {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

impl JobLedger for SqliteJobLedger {
    fn begin(&self) -> AppResult<Box<dyn LedgerTransaction + '_>> {
        let conn = get_connection(&self.pool)?;
        Ok(Box::new(SqliteLedgerTransaction {
            conn,
            state: TxState::Pending,
            drawn_inside: None,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    /// No row written yet; the connection is in autocommit mode.
    Pending,
    Open,
    Closed,
}

/// Explicit BEGIN/COMMIT/ROLLBACK on a pooled connection.
///
/// `BEGIN IMMEDIATE` is deferred to the first row written, so a job id drawn
/// before that is committed on its own and survives a rollback of the
/// booking. Ids drawn after BEGIN are re-reserved once the rollback is done.
pub struct SqliteLedgerTransaction {
    conn: DbConnection,
    state: TxState,
    drawn_inside: Option<i64>,
}

impl SqliteLedgerTransaction {
    fn ensure_open(&mut self) -> AppResult<()> {
        if self.state == TxState::Pending {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.state = TxState::Open;
        }
        Ok(())
    }

    fn draw_job_id(&mut self) -> AppResult<i64> {
        let job_id = next_job_id(&self.conn)?;
        if self.state == TxState::Open {
            self.drawn_inside = Some(self.drawn_inside.map_or(job_id, |max| max.max(job_id)));
        }
        Ok(job_id)
    }

    fn roll_back(&mut self) -> AppResult<()> {
        let was_open = self.state == TxState::Open;
        self.state = TxState::Closed;
        if !was_open {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        if let Some(job_id) = self.drawn_inside.take() {
            reserve_job_ids_through(&self.conn, job_id)?;
        }
        Ok(())
    }
}

impl LedgerTransaction for SqliteLedgerTransaction {
    fn next_job_id(&mut self) -> AppResult<i64> {
        self.draw_job_id()
    }

    fn create_job_event(&mut self, job_id: i64, event_type: JobEventType, payload: &JsonValue) -> AppResult<JobEvent> {
        self.ensure_open()?;
        insert_job_event(&self.conn, job_id, event_type, payload)
    }

    fn create_job(&mut self, job: &NewJob) -> AppResult<Job> {
        self.ensure_open()?;
        let job_id = match job.job_id {
            Some(job_id) => job_id,
            None => self.draw_job_id()?,
        };
        insert_job(&self.conn, job_id, job)
    }

    fn commit(mut self: Box<Self>) -> AppResult<()> {
        if self.state == TxState::Open {
            // On failure the state stays Open and Drop rolls back
            self.conn.execute_batch("COMMIT")?;
        }
        self.state = TxState::Closed;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> AppResult<()> {
        self.roll_back()
    }
}

impl Drop for SqliteLedgerTransaction {
    fn drop(&mut self) {
        if self.state == TxState::Open {
            log::warn!("Ledger transaction dropped while open, rolling back");
            if let Err(e) = self.roll_back() {
                log::error!("Failed to roll back abandoned ledger transaction: {}", e);
            }
        }
    }
}

const JOB_COLUMNS: &str = "job_id, telegram_user_id, telegram_chat_id, customer_name, customer_phone,
    vehicle_make_model, problem_description, scheduled_date, current_status, progress_percentage,
    internal_notes, created_at, updated_at";

fn conversion_error(column: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(8)?;
    Ok(Job {
        job_id: row.get(0)?,
        telegram_user_id: row.get(1)?,
        telegram_chat_id: row.get(2)?,
        customer_name: row.get(3)?,
        customer_phone: row.get(4)?,
        vehicle_make_model: row.get(5)?,
        problem_description: row.get(6)?,
        scheduled_date: row.get(7)?,
        current_status: status.parse().map_err(|e| conversion_error(8, e))?,
        progress_percentage: row.get::<_, u8>(9)?,
        internal_notes: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn parse_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobEvent> {
    let event_type: String = row.get(2)?;
    let payload: String = row.get(3)?;
    Ok(JobEvent {
        event_id: row.get(0)?,
        job_id: row.get(1)?,
        event_type: event_type.parse().map_err(|e| conversion_error(2, e))?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(3, e))?,
        created_at: row.get(4)?,
    })
}

/// Bumps the single-row sequence and returns the new value.
///
/// Outside a transaction the bump is committed immediately.
pub fn next_job_id(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row(
        "UPDATE job_id_sequence SET value = value + 1 WHERE id = 1 RETURNING value",
        [],
        |row| row.get(0),
    )?)
}

/// Moves the sequence to at least `job_id` so it is never handed out again.
fn reserve_job_ids_through(conn: &Connection, job_id: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE job_id_sequence SET value = MAX(value, ?1) WHERE id = 1",
        params![job_id],
    )?;
    Ok(())
}

pub fn insert_job_event(
    conn: &Connection,
    job_id: i64,
    event_type: JobEventType,
    payload: &JsonValue,
) -> AppResult<JobEvent> {
    Ok(conn.query_row(
        "INSERT INTO job_events (job_id, event_type, payload) VALUES (?1, ?2, ?3)
         RETURNING event_id, job_id, event_type, payload, created_at",
        params![job_id, event_type.as_ref(), payload.to_string()],
        parse_event_row,
    )?)
}

fn insert_job(conn: &Connection, job_id: i64, job: &NewJob) -> AppResult<Job> {
    let sql = format!(
        "INSERT INTO jobs (job_id, telegram_user_id, telegram_chat_id, customer_name, customer_phone,
            vehicle_make_model, problem_description, scheduled_date, current_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         RETURNING {}",
        JOB_COLUMNS
    );
    Ok(conn.query_row(
        &sql,
        params![
            job_id,
            job.telegram_user_id,
            job.telegram_chat_id,
            job.customer_name,
            job.customer_phone,
            job.vehicle_make_model,
            job.problem_description,
            job.scheduled_date,
            job.current_status.as_ref(),
        ],
        parse_job_row,
    )?)
}

pub fn get_job(conn: &Connection, job_id: i64) -> AppResult<Option<Job>> {
    let sql = format!("SELECT {} FROM jobs WHERE job_id = ?1", JOB_COLUMNS);
    Ok(conn.query_row(&sql, params![job_id], parse_job_row).optional()?)
}

/// Jobs matching the filter, newest first.
pub fn list_jobs(conn: &Connection, filter: &JobFilter) -> AppResult<Vec<Job>> {
    let mut sql = format!("SELECT {} FROM jobs", JOB_COLUMNS);
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = filter.status {
        values.push(Value::Text(status.to_string()));
        conditions.push(format!("current_status = ?{}", values.len()));
    }
    if let Some(user_id) = filter.telegram_user_id {
        values.push(Value::Integer(user_id));
        conditions.push(format!("telegram_user_id = ?{}", values.len()));
    }
    if let Some(chat_id) = filter.telegram_chat_id {
        values.push(Value::Integer(chat_id));
        conditions.push(format!("telegram_chat_id = ?{}", values.len()));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, job_id DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let jobs = stmt
        .query_map(params_from_iter(values.iter()), parse_job_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(jobs)
}

/// Events of one job in write order.
pub fn list_job_events(conn: &Connection, job_id: i64) -> AppResult<Vec<JobEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, job_id, event_type, payload, created_at
         FROM job_events WHERE job_id = ?1 ORDER BY event_id",
    )?;
    let events = stmt
        .query_map(params![job_id], parse_event_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

pub fn count_jobs(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?)
}

/// Runs `update` and records `event` in one transaction.
///
/// Returns `None` (and writes nothing) when the job does not exist.
fn update_with_event(
    conn: &Connection,
    job_id: i64,
    event_type: JobEventType,
    update_sql: &str,
    update_value: Value,
    payload: impl FnOnce(&Job) -> JsonValue,
) -> AppResult<Option<Job>> {
    let tx = conn.unchecked_transaction()?;

    let Some(before) = get_job(&tx, job_id)? else {
        return Ok(None);
    };

    insert_job_event(&tx, job_id, event_type, &payload(&before))?;
    tx.execute(update_sql, params![update_value, job_id])?;
    let after = get_job(&tx, job_id)?;

    tx.commit()?;
    Ok(after)
}

pub fn update_job_status(conn: &Connection, job_id: i64, status: JobStatus, actor_id: i64) -> AppResult<Option<Job>> {
    update_with_event(
        conn,
        job_id,
        JobEventType::StatusChanged,
        "UPDATE jobs SET current_status = ?1, updated_at = CURRENT_TIMESTAMP WHERE job_id = ?2",
        Value::Text(status.to_string()),
        |before| json!({ "from": before.current_status.as_ref(), "to": status.as_ref(), "actor_id": actor_id }),
    )
}

pub fn update_job_progress(conn: &Connection, job_id: i64, progress: u8, actor_id: i64) -> AppResult<Option<Job>> {
    update_with_event(
        conn,
        job_id,
        JobEventType::ProgressUpdated,
        "UPDATE jobs SET progress_percentage = ?1, updated_at = CURRENT_TIMESTAMP WHERE job_id = ?2",
        Value::Integer(i64::from(progress)),
        |before| json!({ "from": before.progress_percentage, "to": progress, "actor_id": actor_id }),
    )
}

/// `None` clears the notes.
pub fn update_job_notes(conn: &Connection, job_id: i64, notes: Option<&str>, actor_id: i64) -> AppResult<Option<Job>> {
    let value = notes.map_or(Value::Null, |text| Value::Text(text.to_string()));
    update_with_event(
        conn,
        job_id,
        JobEventType::NotesUpdated,
        "UPDATE jobs SET internal_notes = ?1, updated_at = CURRENT_TIMESTAMP WHERE job_id = ?2",
        value,
        |_| json!({ "notes": notes, "actor_id": actor_id }),
    )
}
