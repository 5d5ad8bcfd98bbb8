//! Test doubles for the booking orchestration
//!
//! `RecordingLedger` stands in for the SQLite ledger and records every call in
//! order, so tests can assert on the event-before-job sequence and on
//! rollbacks without a database.
//!
//! ```rust
//! use tallerbot::testing::{LedgerCall, RecordingLedger};
//!
//! let ledger = RecordingLedger::new(42).failing_create_job();
//! assert!(ledger.calls().is_empty());
//! assert_ne!(LedgerCall::Begin, LedgerCall::Commit);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value as JsonValue;

use crate::core::error::{AppError, AppResult};
use crate::storage::jobs::{Job, JobEvent, JobEventType, JobLedger, LedgerTransaction, NewJob};

pub use crate::storage::MemorySessionStore;

/// One recorded ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Begin,
    NextJobId,
    CreateJobEvent { job_id: i64, event_type: JobEventType },
    CreateJob { job_id: i64 },
    Commit,
    Rollback,
}

/// Step at which a `RecordingLedger` transaction reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Begin,
    NextJobId,
    CreateJobEvent,
    CreateJob,
    Commit,
}

#[derive(Default)]
struct State {
    calls: Vec<LedgerCall>,
    next_id: i64,
    jobs: Vec<Job>,
    events: Vec<JobEvent>,
}

/// In-memory ledger that records calls and keeps committed rows.
#[derive(Clone)]
pub struct RecordingLedger {
    state: Arc<Mutex<State>>,
    fail_at: Option<FailAt>,
}

impl RecordingLedger {
    /// `first_id` is returned by the first `next_job_id` call.
    pub fn new(first_id: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_id: first_id,
                ..State::default()
            })),
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn failing_create_job(self) -> Self {
        self.failing_at(FailAt::CreateJob)
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.lock().calls.clone()
    }

    /// Jobs from committed transactions only.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    /// Events from committed transactions only.
    pub fn events(&self) -> Vec<JobEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, step: FailAt) -> AppResult<()> {
        if self.fail_at == Some(step) {
            return Err(AppError::Validation(format!("injected failure at {:?}", step)));
        }
        Ok(())
    }
}

impl JobLedger for RecordingLedger {
    fn begin(&self) -> AppResult<Box<dyn LedgerTransaction + '_>> {
        self.lock().calls.push(LedgerCall::Begin);
        self.check(FailAt::Begin)?;
        Ok(Box::new(RecordingTransaction {
            ledger: self,
            jobs: Vec::new(),
            events: Vec::new(),
        }))
    }
}

struct RecordingTransaction<'a> {
    ledger: &'a RecordingLedger,
    jobs: Vec<Job>,
    events: Vec<JobEvent>,
}

impl RecordingTransaction<'_> {
    fn record(&self, call: LedgerCall) {
        self.ledger.lock().calls.push(call);
    }
}

impl LedgerTransaction for RecordingTransaction<'_> {
    fn next_job_id(&mut self) -> AppResult<i64> {
        self.record(LedgerCall::NextJobId);
        self.ledger.check(FailAt::NextJobId)?;
        let mut state = self.ledger.lock();
        let id = state.next_id;
        state.next_id += 1;
        Ok(id)
    }

    fn create_job_event(&mut self, job_id: i64, event_type: JobEventType, payload: &JsonValue) -> AppResult<JobEvent> {
        self.record(LedgerCall::CreateJobEvent { job_id, event_type });
        self.ledger.check(FailAt::CreateJobEvent)?;
        let event = JobEvent {
            event_id: self.events.len() as i64 + 1,
            job_id,
            event_type,
            payload: payload.clone(),
            created_at: String::new(),
        };
        self.events.push(event.clone());
        Ok(event)
    }

    fn create_job(&mut self, job: &NewJob) -> AppResult<Job> {
        let job_id = job.job_id.unwrap_or_default();
        self.record(LedgerCall::CreateJob { job_id });
        self.ledger.check(FailAt::CreateJob)?;
        let created = Job {
            job_id,
            telegram_user_id: job.telegram_user_id,
            telegram_chat_id: job.telegram_chat_id,
            customer_name: job.customer_name.clone(),
            customer_phone: job.customer_phone.clone(),
            vehicle_make_model: job.vehicle_make_model.clone(),
            problem_description: job.problem_description.clone(),
            scheduled_date: job.scheduled_date.clone(),
            current_status: job.current_status,
            progress_percentage: 0,
            internal_notes: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        self.jobs.push(created.clone());
        Ok(created)
    }

    fn commit(self: Box<Self>) -> AppResult<()> {
        self.record(LedgerCall::Commit);
        self.ledger.check(FailAt::Commit)?;
        let Self { ledger, jobs, events } = *self;
        let mut state = ledger.lock();
        state.jobs.extend(jobs);
        state.events.extend(events);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> AppResult<()> {
        self.record(LedgerCall::Rollback);
        Ok(())
    }
}
