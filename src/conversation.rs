//! Booking conversation: session load, engine step, session save, side effects
//!
//! The session is saved before any action runs. A commit therefore always
//! leaves the user with a cleared session, whether the ledger write succeeds
//! or not.

use std::sync::Arc;

use fluent_templates::fluent_bundle::FluentArgs;
use unic_langid::LanguageIdentifier;

use crate::core::error::AppResult;
use crate::flow::{self, Action, Flow, FlowData, SessionData};
use crate::i18n;
use crate::storage::jobs::{Job, JobEventType, JobLedger, LedgerTransaction, NewJob};
use crate::storage::SessionStore;

/// Who sent a message. Either id may be missing (channel posts, anonymous admins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sender {
    pub user_id: Option<i64>,
    pub chat_id: Option<i64>,
}

impl Sender {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            chat_id: Some(chat_id),
        }
    }
}

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(Job),
    /// User or chat id absent; the ledger was not touched.
    MissingIdentity,
    /// The transaction was rolled back.
    Failed,
}

/// Writes the JOB_SCHEDULED event and then the job, in one transaction.
///
/// Never retries. Errors are logged with the acting user id and collapsed
/// into `CommitOutcome::Failed`.
pub fn commit_booking(ledger: &dyn JobLedger, sender: Sender, data: &FlowData) -> CommitOutcome {
    let (Some(user_id), Some(chat_id)) = (sender.user_id, sender.chat_id) else {
        return CommitOutcome::MissingIdentity;
    };

    let mut tx = match ledger.begin() {
        Ok(tx) => tx,
        Err(e) => {
            log::error!("Failed to begin booking transaction for user_id={}: {}", user_id, e);
            return CommitOutcome::Failed;
        }
    };

    match write_booking(tx.as_mut(), user_id, chat_id, data) {
        Ok(job) => match tx.commit() {
            Ok(()) => {
                log::info!("Booked job #{} for user_id={}", job.job_id, user_id);
                CommitOutcome::Committed(job)
            }
            Err(e) => {
                log::error!("Failed to commit booking for user_id={}: {}", user_id, e);
                CommitOutcome::Failed
            }
        },
        Err(e) => {
            log::error!("Failed to write booking for user_id={}: {}", user_id, e);
            if let Err(rollback_err) = tx.rollback() {
                log::error!(
                    "Failed to roll back booking for user_id={}: {}",
                    user_id,
                    rollback_err
                );
            }
            CommitOutcome::Failed
        }
    }
}

fn write_booking(tx: &mut dyn LedgerTransaction, user_id: i64, chat_id: i64, data: &FlowData) -> AppResult<Job> {
    let job_id = tx.next_job_id()?;
    let payload = serde_json::to_value(data)?;
    tx.create_job_event(job_id, JobEventType::JobScheduled, &payload)?;
    tx.create_job(&NewJob::from_flow_data(job_id, user_id, chat_id, data))
}

/// Drives one user's booking conversation against the shared flow.
pub struct Conversation {
    flow: Arc<Flow>,
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn JobLedger>,
}

impl Conversation {
    pub fn new(flow: Arc<Flow>, sessions: Arc<dyn SessionStore>, ledger: Arc<dyn JobLedger>) -> Self {
        Self { flow, sessions, ledger }
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Starts (or restarts) the booking flow and returns the first prompt.
    pub fn start(&self, user_id: i64) -> AppResult<String> {
        let started = flow::start(&self.flow);
        self.sessions.set(user_id, &started.session)?;

        log::info!("Booking flow started for user_id={}", user_id);
        match started.action {
            Action::Prompt(prompt) => Ok(prompt),
            _ => Ok(String::new()),
        }
    }

    /// Abandons the conversation in progress, if any.
    pub fn cancel(&self, user_id: i64, lang: &LanguageIdentifier) -> AppResult<String> {
        let session = self.sessions.get(user_id)?;
        if !session.is_active() {
            return Ok(i18n::t(lang, "booking-nothing-to-cancel"));
        }

        self.sessions.set(user_id, &SessionData::default())?;
        log::info!("Booking flow cancelled by command for user_id={}", user_id);
        Ok(self.cancel_reply(self.flow.cancel_prompt().map(str::to_string), lang))
    }

    /// Feeds one line of text into the flow. `None` means: do not reply.
    pub fn handle_text(&self, sender: Sender, text: &str, lang: &LanguageIdentifier) -> AppResult<Option<String>> {
        let Some(user_id) = sender.user_id else {
            return Ok(None);
        };

        let session = self.sessions.get(user_id)?;
        let step = flow::advance(&self.flow, &session, text);
        self.sessions.set(user_id, &step.session)?;

        let reply = match step.action {
            Action::Prompt(prompt) => Some(prompt),
            Action::Cancel(prompt) => {
                log::info!("Booking flow cancelled for user_id={}", user_id);
                Some(self.cancel_reply(prompt, lang))
            }
            Action::Commit(data) => Some(self.commit_reply(sender, &data, lang)),
            Action::Noop => {
                if let Some(current) = session.current_step.as_deref().filter(|key| self.flow.step(key).is_some()) {
                    log::warn!(
                        "Flow step {} has no resolvable next step, dropping message from user_id={}",
                        current,
                        user_id
                    );
                }
                None
            }
        };

        Ok(reply)
    }

    fn cancel_reply(&self, prompt: Option<String>, lang: &LanguageIdentifier) -> String {
        prompt.unwrap_or_else(|| i18n::t(lang, "booking-cancelled"))
    }

    fn commit_reply(&self, sender: Sender, data: &FlowData, lang: &LanguageIdentifier) -> String {
        match commit_booking(self.ledger.as_ref(), sender, data) {
            CommitOutcome::Committed(job) => {
                let mut args = FluentArgs::new();
                args.set("job_id", format!("#{}", job.job_id));
                let confirmation = i18n::t_args(lang, "booking-committed", &args);

                match self.flow.commit_prompt() {
                    Some(prompt) => format!("{}\n\n{}", flow::render_prompt(prompt, data), confirmation),
                    None => confirmation,
                }
            }
            CommitOutcome::MissingIdentity => i18n::t(lang, "booking-missing-identity"),
            CommitOutcome::Failed => i18n::t(lang, "booking-failed"),
        }
    }
}
