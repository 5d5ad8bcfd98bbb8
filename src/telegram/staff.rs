//! Staff commands over the job ledger (/trabajos, /estado, /setestado, /progreso, /nota)
//!
//! Access is decided by the STAFF_IDS allow-list. Parsing is separated from
//! execution so both can be tested without Telegram.

use fluent_templates::fluent_bundle::FluentArgs;
use rusqlite::Connection;
use strum::IntoEnumIterator;
use unic_langid::LanguageIdentifier;

use crate::core::config;
use crate::core::error::AppResult;
use crate::i18n;
use crate::storage::jobs::{self, Job, JobFilter, JobStatus};
use crate::telegram::bot::Command;

/// Check if user is staff. An empty allow-list admits nobody.
pub fn is_staff(user_id: Option<i64>, staff_ids: &[i64]) -> bool {
    match user_id {
        Some(id) => staff_ids.contains(&id),
        None => false,
    }
}

/// A parsed staff command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaffCommand {
    ListJobs(Option<JobStatus>),
    ShowJob(i64),
    SetStatus(i64, JobStatus),
    SetProgress(i64, u8),
    /// `None` clears the notes.
    SetNotes(i64, Option<String>),
}

/// Which usage message to show for malformed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffUsage {
    Trabajos,
    Estado,
    SetEstado,
    Progreso,
    Nota,
}

impl StaffUsage {
    fn key(self) -> &'static str {
        match self {
            Self::Trabajos => "staff-usage-trabajos",
            Self::Estado => "staff-usage-estado",
            Self::SetEstado => "staff-usage-setestado",
            Self::Progreso => "staff-usage-progreso",
            Self::Nota => "staff-usage-nota",
        }
    }

    /// Localized usage text.
    pub fn text(self, lang: &LanguageIdentifier) -> String {
        let mut args = FluentArgs::new();
        args.set("statuses", status_list());
        i18n::t_args(lang, self.key(), &args)
    }
}

fn status_list() -> String {
    JobStatus::iter()
        .map(|status| status.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Accepts `12` or `#12`.
fn parse_job_id(raw: &str) -> Option<i64> {
    raw.trim_start_matches('#').parse::<i64>().ok().filter(|id| *id > 0)
}

fn parse_status(raw: &str) -> Option<JobStatus> {
    raw.trim().to_uppercase().parse().ok()
}

impl StaffCommand {
    /// `None` for commands that are not staff commands.
    pub fn from_command(cmd: &Command) -> Option<Result<Self, StaffUsage>> {
        let parsed = match cmd {
            Command::Trabajos(args) => Self::parse_list(args),
            Command::Estado(args) => Self::parse_show(args),
            Command::SetEstado(args) => Self::parse_set_status(args),
            Command::Progreso(args) => Self::parse_progress(args),
            Command::Nota(args) => Self::parse_notes(args),
            _ => return None,
        };
        Some(parsed)
    }

    fn parse_list(args: &str) -> Result<Self, StaffUsage> {
        let args = args.trim();
        if args.is_empty() {
            return Ok(Self::ListJobs(None));
        }
        parse_status(args)
            .map(|status| Self::ListJobs(Some(status)))
            .ok_or(StaffUsage::Trabajos)
    }

    fn parse_show(args: &str) -> Result<Self, StaffUsage> {
        let mut parts = args.split_whitespace();
        match (parts.next().and_then(parse_job_id), parts.next()) {
            (Some(job_id), None) => Ok(Self::ShowJob(job_id)),
            _ => Err(StaffUsage::Estado),
        }
    }

    fn parse_set_status(args: &str) -> Result<Self, StaffUsage> {
        let mut parts = args.split_whitespace();
        match (
            parts.next().and_then(parse_job_id),
            parts.next().and_then(parse_status),
            parts.next(),
        ) {
            (Some(job_id), Some(status), None) => Ok(Self::SetStatus(job_id, status)),
            _ => Err(StaffUsage::SetEstado),
        }
    }

    fn parse_progress(args: &str) -> Result<Self, StaffUsage> {
        let mut parts = args.split_whitespace();
        let progress = parts
            .next()
            .and_then(parse_job_id)
            .zip(parts.next().map(|p| p.trim_end_matches('%')).and_then(|p| p.parse::<u8>().ok()));
        match (progress, parts.next()) {
            (Some((job_id, progress)), None) if progress <= 100 => Ok(Self::SetProgress(job_id, progress)),
            _ => Err(StaffUsage::Progreso),
        }
    }

    fn parse_notes(args: &str) -> Result<Self, StaffUsage> {
        let args = args.trim();
        let (id, text) = args.split_once(char::is_whitespace).ok_or(StaffUsage::Nota)?;
        let job_id = parse_job_id(id).ok_or(StaffUsage::Nota)?;
        match text.trim() {
            "" => Err(StaffUsage::Nota),
            "-" => Ok(Self::SetNotes(job_id, None)),
            text => Ok(Self::SetNotes(job_id, Some(text.to_string()))),
        }
    }
}

fn display_job_id(job_id: i64) -> String {
    format!("#{}", job_id)
}

fn job_args(job: &Job) -> FluentArgs<'static> {
    let mut args = FluentArgs::new();
    args.set("job_id", display_job_id(job.job_id));
    args.set("status", job.current_status.to_string());
    args.set("progress", job.progress_percentage.to_string());
    args
}

fn or_missing(value: Option<&str>, lang: &LanguageIdentifier) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.to_string(),
        None => i18n::t(lang, "value-missing"),
    }
}

/// One-line summary used in job lists.
pub fn format_job_line(lang: &LanguageIdentifier, job: &Job) -> String {
    let mut args = job_args(job);
    args.set("vehicle", or_missing(job.vehicle_make_model.as_deref(), lang));
    i18n::t_args(lang, "job-line", &args)
}

/// Full job card, including staff-only notes.
pub fn format_job_card(lang: &LanguageIdentifier, job: &Job) -> String {
    let mut args = job_args(job);
    args.set("name", or_missing(job.customer_name.as_deref(), lang));
    args.set("phone", or_missing(job.customer_phone.as_deref(), lang));
    args.set("vehicle", or_missing(job.vehicle_make_model.as_deref(), lang));
    args.set("problem", or_missing(job.problem_description.as_deref(), lang));
    args.set("date", or_missing(job.scheduled_date.as_deref(), lang));
    args.set("notes", or_missing(job.internal_notes.as_deref(), lang));
    args.set("created", job.created_at.clone());
    i18n::t_args(lang, "job-card", &args)
}

fn job_id_args(job_id: i64) -> FluentArgs<'static> {
    let mut args = FluentArgs::new();
    args.set("job_id", display_job_id(job_id));
    args
}

fn not_found(lang: &LanguageIdentifier, job_id: i64) -> String {
    i18n::t_args(lang, "staff-job-not-found", &job_id_args(job_id))
}

/// Executes a staff command and returns the reply text.
///
/// A missing job is a normal reply, not an error.
pub fn run_staff_command(
    conn: &Connection,
    lang: &LanguageIdentifier,
    cmd: &StaffCommand,
    actor_id: i64,
) -> AppResult<String> {
    let reply = match cmd {
        StaffCommand::ListJobs(status) => {
            let filter = JobFilter {
                status: *status,
                limit: Some(config::jobs::LIST_LIMIT),
                ..JobFilter::default()
            };
            let found = jobs::list_jobs(conn, &filter)?;
            if found.is_empty() {
                i18n::t(lang, "staff-no-jobs")
            } else {
                let mut args = FluentArgs::new();
                args.set("count", found.len().to_string());
                let mut lines = vec![i18n::t_args(lang, "staff-jobs-header", &args)];
                lines.extend(found.iter().map(|job| format_job_line(lang, job)));
                lines.join("\n")
            }
        }
        StaffCommand::ShowJob(job_id) => match jobs::get_job(conn, *job_id)? {
            Some(job) => format_job_card(lang, &job),
            None => not_found(lang, *job_id),
        },
        StaffCommand::SetStatus(job_id, status) => match jobs::update_job_status(conn, *job_id, *status, actor_id)? {
            Some(job) => {
                log::info!("Staff {} set job #{} status to {}", actor_id, job_id, status);
                i18n::t_args(lang, "staff-status-updated", &job_args(&job))
            }
            None => not_found(lang, *job_id),
        },
        StaffCommand::SetProgress(job_id, progress) => {
            match jobs::update_job_progress(conn, *job_id, *progress, actor_id)? {
                Some(job) => {
                    log::info!("Staff {} set job #{} progress to {}%", actor_id, job_id, progress);
                    i18n::t_args(lang, "staff-progress-updated", &job_args(&job))
                }
                None => not_found(lang, *job_id),
            }
        }
        StaffCommand::SetNotes(job_id, notes) => {
            match jobs::update_job_notes(conn, *job_id, notes.as_deref(), actor_id)? {
                Some(_) => {
                    log::info!("Staff {} updated notes of job #{}", actor_id, job_id);
                    let key = if notes.is_some() {
                        "staff-notes-updated"
                    } else {
                        "staff-notes-cleared"
                    };
                    i18n::t_args(lang, key, &job_id_args(*job_id))
                }
                None => not_found(lang, *job_id),
            }
        }
    };

    Ok(reply)
}

/// The /mistrabajos reply: the customer's own jobs, without staff notes.
pub fn customer_jobs_text(conn: &Connection, lang: &LanguageIdentifier, telegram_user_id: i64) -> AppResult<String> {
    let filter = JobFilter {
        telegram_user_id: Some(telegram_user_id),
        limit: Some(config::jobs::CUSTOMER_LIST_LIMIT),
        ..JobFilter::default()
    };
    let found = jobs::list_jobs(conn, &filter)?;
    if found.is_empty() {
        return Ok(i18n::t(lang, "jobs-mine-empty"));
    }

    let mut lines = vec![i18n::t(lang, "jobs-mine-header")];
    lines.extend(found.iter().map(|job| format_job_line(lang, job)));
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowData;
    use crate::storage::db::test_support::temp_pool;
    use crate::storage::get_connection;
    use crate::storage::jobs::{NewJob, SqliteJobLedger};
    use crate::storage::{JobLedger, LedgerTransaction};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn es() -> LanguageIdentifier {
        i18n::lang_from_code("es")
    }

    fn seed(conn_pool: &Arc<crate::storage::DbPool>, user_id: i64) -> i64 {
        let ledger = SqliteJobLedger::new(conn_pool.clone());
        let data: FlowData = [
            ("customer_name".to_string(), "Ana".to_string()),
            ("vehicle_make_model".to_string(), "Toyota Corolla".to_string()),
        ]
        .into();
        let mut tx = ledger.begin().unwrap();
        let id = tx.next_job_id().unwrap();
        tx.create_job(&NewJob::from_flow_data(id, user_id, user_id, &data)).unwrap();
        tx.commit().unwrap();
        id
    }

    #[test]
    fn test_is_staff() {
        assert!(is_staff(Some(1), &[1, 2]));
        assert!(!is_staff(Some(3), &[1, 2]));
        assert!(!is_staff(None, &[1, 2]));
        assert!(!is_staff(Some(1), &[]));
    }

    #[test]
    fn test_parse_commands() {
        let parse = |cmd: Command| StaffCommand::from_command(&cmd).unwrap();

        assert_eq!(parse(Command::Trabajos(String::new())), Ok(StaffCommand::ListJobs(None)));
        assert_eq!(
            parse(Command::Trabajos("en_revision".into())),
            Ok(StaffCommand::ListJobs(Some(JobStatus::EnRevision)))
        );
        assert_eq!(parse(Command::Trabajos("DONE".into())), Err(StaffUsage::Trabajos));
        assert_eq!(parse(Command::Estado("#12".into())), Ok(StaffCommand::ShowJob(12)));
        assert_eq!(parse(Command::Estado("x".into())), Err(StaffUsage::Estado));
        assert_eq!(
            parse(Command::SetEstado("3 COMPLETADO".into())),
            Ok(StaffCommand::SetStatus(3, JobStatus::Completado))
        );
        assert_eq!(parse(Command::SetEstado("3".into())), Err(StaffUsage::SetEstado));
        assert_eq!(parse(Command::Progreso("3 50%".into())), Ok(StaffCommand::SetProgress(3, 50)));
        assert_eq!(parse(Command::Progreso("3 101".into())), Err(StaffUsage::Progreso));
        assert_eq!(
            parse(Command::Nota("3 cambiar  frenos".into())),
            Ok(StaffCommand::SetNotes(3, Some("cambiar  frenos".to_string())))
        );
        assert_eq!(parse(Command::Nota("3 -".into())), Ok(StaffCommand::SetNotes(3, None)));
        assert_eq!(parse(Command::Nota("3".into())), Err(StaffUsage::Nota));
        assert!(StaffCommand::from_command(&Command::Agendar).is_none());
    }

    #[test]
    fn test_usage_lists_statuses() {
        let text = StaffUsage::SetEstado.text(&es());
        assert!(text.contains("/setestado"));
        assert!(text.contains("LISTO_PARA_ENTREGA"));
    }

    #[test]
    fn test_list_and_show() {
        let (_dir, pool) = temp_pool();
        let pool = Arc::new(pool);
        let conn = get_connection(&pool).unwrap();

        assert_eq!(
            run_staff_command(&conn, &es(), &StaffCommand::ListJobs(None), 1).unwrap(),
            i18n::t(&es(), "staff-no-jobs")
        );

        let id = seed(&pool, 77);
        let list = run_staff_command(&conn, &es(), &StaffCommand::ListJobs(None), 1).unwrap();
        assert!(list.contains(&format!("#{}", id)));
        assert!(list.contains("Toyota Corolla"));
        assert!(list.contains("LEAD"));

        let filtered = run_staff_command(&conn, &es(), &StaffCommand::ListJobs(Some(JobStatus::Completado)), 1).unwrap();
        assert_eq!(filtered, i18n::t(&es(), "staff-no-jobs"));

        let card = run_staff_command(&conn, &es(), &StaffCommand::ShowJob(id), 1).unwrap();
        assert!(card.contains("Ana"));

        let missing = run_staff_command(&conn, &es(), &StaffCommand::ShowJob(999), 1).unwrap();
        assert!(missing.contains("#999"));
    }

    #[test]
    fn test_updates_write_events() {
        let (_dir, pool) = temp_pool();
        let pool = Arc::new(pool);
        let conn = get_connection(&pool).unwrap();
        let id = seed(&pool, 77);

        let reply = run_staff_command(&conn, &es(), &StaffCommand::SetStatus(id, JobStatus::Agendado), 5).unwrap();
        assert!(reply.contains("AGENDADO"));
        run_staff_command(&conn, &es(), &StaffCommand::SetProgress(id, 40), 5).unwrap();
        run_staff_command(&conn, &es(), &StaffCommand::SetNotes(id, Some("pastillas".into())), 5).unwrap();

        let job = jobs::get_job(&conn, id).unwrap().unwrap();
        assert_eq!(job.current_status, JobStatus::Agendado);
        assert_eq!(job.progress_percentage, 40);
        assert_eq!(job.internal_notes.as_deref(), Some("pastillas"));
        assert_eq!(jobs::list_job_events(&conn, id).unwrap().len(), 3);

        let cleared = run_staff_command(&conn, &es(), &StaffCommand::SetNotes(id, None), 5).unwrap();
        assert_eq!(cleared, i18n::t_args(&es(), "staff-notes-cleared", &job_id_args(id)));
        assert_eq!(jobs::get_job(&conn, id).unwrap().unwrap().internal_notes, None);

        let missing = run_staff_command(&conn, &es(), &StaffCommand::SetProgress(999, 10), 5).unwrap();
        assert!(missing.contains("#999"));
        assert!(jobs::list_job_events(&conn, 999).unwrap().is_empty());
    }

    #[test]
    fn test_customer_jobs_hide_notes() {
        let (_dir, pool) = temp_pool();
        let pool = Arc::new(pool);
        let conn = get_connection(&pool).unwrap();

        assert_eq!(
            customer_jobs_text(&conn, &es(), 77).unwrap(),
            i18n::t(&es(), "jobs-mine-empty")
        );

        let id = seed(&pool, 77);
        seed(&pool, 88);
        jobs::update_job_notes(&conn, id, Some("secreto"), 5).unwrap();

        let text = customer_jobs_text(&conn, &es(), 77).unwrap();
        assert!(text.contains(&format!("#{}", id)));
        assert!(!text.contains("secreto"));
        assert_eq!(text.lines().count(), 2);
    }
}
