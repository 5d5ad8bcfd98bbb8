//! End-to-end booking conversations against a real SQLite database
//!
//! Run with: cargo test --test booking_flow_test

mod common;

use common::{agendar_flow, es, TestEnvironment};
use pretty_assertions::assert_eq;
use serde_json::json;
use tallerbot::flow::SessionData;
use tallerbot::i18n;
use tallerbot::storage::jobs::{count_jobs, get_job, list_job_events, JobEventType, JobStatus};
use tallerbot::storage::{get_connection, SessionStore, SqliteSessionStore};
use tallerbot::telegram::strip_bot_mention;
use tallerbot::Sender;

const USER: i64 = 123;
const CHAT: i64 = 456;

fn answers() -> [&'static str; 5] {
    ["Jane Doe", "+56 9 1234 5678", "Toyota Corolla 2015", "Ruido al frenar", "Lunes 10:00"]
}

#[test]
fn full_booking_creates_job_and_event() {
    let env = TestEnvironment::new();
    let conversation = env.conversation(agendar_flow());
    let sender = Sender::new(USER, CHAT);

    let first = conversation.start(USER).unwrap();
    assert!(first.contains("nombre"));

    let mut last = String::new();
    for answer in answers() {
        last = conversation.handle_text(sender, answer, &es()).unwrap().unwrap();
    }
    assert!(last.contains("Jane Doe"));
    assert!(last.contains("Ruido al frenar"));

    let reply = conversation.handle_text(sender, "Sí", &es()).unwrap().unwrap();

    let conn = get_connection(&env.pool).unwrap();
    assert_eq!(count_jobs(&conn).unwrap(), 1);
    let job = get_job(&conn, 1).unwrap().unwrap();
    assert!(reply.contains("#1"), "reply: {}", reply);
    assert!(reply.starts_with("¡Gracias, Jane Doe!"));

    assert_eq!(job.telegram_user_id, USER);
    assert_eq!(job.telegram_chat_id, CHAT);
    assert_eq!(job.customer_name.as_deref(), Some("Jane Doe"));
    assert_eq!(job.customer_phone.as_deref(), Some("+56 9 1234 5678"));
    assert_eq!(job.vehicle_make_model.as_deref(), Some("Toyota Corolla 2015"));
    assert_eq!(job.problem_description.as_deref(), Some("Ruido al frenar"));
    assert_eq!(job.scheduled_date.as_deref(), Some("Lunes 10:00"));
    assert_eq!(job.current_status, JobStatus::Lead);

    let events = list_job_events(&conn, 1).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, JobEventType::JobScheduled);
    assert_eq!(
        events[0].payload,
        json!({
            "customer_name": "Jane Doe",
            "customer_phone": "+56 9 1234 5678",
            "vehicle_make_model": "Toyota Corolla 2015",
            "problem_description": "Ruido al frenar",
            "scheduled_date": "Lunes 10:00",
        })
    );

    let sessions = SqliteSessionStore::new(env.pool.clone());
    assert_eq!(sessions.get(USER).unwrap(), SessionData::default());

    // The reset session ignores further messages.
    assert_eq!(conversation.handle_text(sender, "Sí", &es()).unwrap(), None);
    assert_eq!(count_jobs(&conn).unwrap(), 1);
}

#[test]
fn consecutive_bookings_get_increasing_ids() {
    let env = TestEnvironment::new();
    let conversation = env.conversation(agendar_flow());

    for (user, expected) in [(1_i64, "#1"), (2, "#2")] {
        let sender = Sender::new(user, user);
        conversation.start(user).unwrap();
        for answer in answers() {
            conversation.handle_text(sender, answer, &es()).unwrap();
        }
        let reply = conversation.handle_text(sender, "sí", &es()).unwrap().unwrap();
        assert!(reply.contains(expected), "reply: {}", reply);
    }
}

#[test]
fn negative_confirmation_writes_nothing() {
    let env = TestEnvironment::new();
    let conversation = env.conversation(agendar_flow());
    let sender = Sender::new(USER, CHAT);

    conversation.start(USER).unwrap();
    for answer in answers() {
        conversation.handle_text(sender, answer, &es()).unwrap();
    }
    let reply = conversation.handle_text(sender, "si", &es()).unwrap().unwrap();

    assert!(reply.starts_with("Cita cancelada"));
    let conn = get_connection(&env.pool).unwrap();
    assert_eq!(count_jobs(&conn).unwrap(), 0);
}

#[test]
fn session_survives_restart() {
    let env = TestEnvironment::new();
    let sender = Sender::new(USER, CHAT);

    {
        let conversation = env.conversation(agendar_flow());
        conversation.start(USER).unwrap();
        conversation.handle_text(sender, "Jane Doe", &es()).unwrap();
    }

    let conversation = env.conversation(agendar_flow());
    let reply = conversation.handle_text(sender, "+56 9 1234 5678", &es()).unwrap().unwrap();
    assert!(reply.contains("vehículo"), "reply: {}", reply);

    let sessions = SqliteSessionStore::new(env.pool.clone());
    let session = sessions.get(USER).unwrap();
    assert_eq!(session.current_step.as_deref(), Some("AWAIT_VEHICLE"));
    assert_eq!(session.flow_data.len(), 2);
}

#[test]
fn cancel_command_mid_flow() {
    let env = TestEnvironment::new();
    let conversation = env.conversation(agendar_flow());
    let sender = Sender::new(USER, CHAT);

    conversation.start(USER).unwrap();
    conversation.handle_text(sender, "Jane Doe", &es()).unwrap();

    let reply = conversation.cancel(USER, &es()).unwrap();
    assert!(reply.starts_with("Cita cancelada"));
    assert_eq!(
        conversation.cancel(USER, &es()).unwrap(),
        i18n::t(&es(), "booking-nothing-to-cancel")
    );
    assert_eq!(conversation.handle_text(sender, "hola", &es()).unwrap(), None);
}

#[test]
fn restart_discards_previous_answers() {
    let env = TestEnvironment::new();
    let conversation = env.conversation(agendar_flow());
    let sender = Sender::new(USER, CHAT);

    conversation.start(USER).unwrap();
    conversation.handle_text(sender, "Jane Doe", &es()).unwrap();
    conversation.start(USER).unwrap();

    let sessions = SqliteSessionStore::new(env.pool.clone());
    let session = sessions.get(USER).unwrap();
    assert_eq!(session.current_step.as_deref(), Some("AWAIT_NAME"));
    assert!(session.flow_data.is_empty());
}

#[test]
fn group_answers_with_bot_mention_confirm_the_booking() {
    let env = TestEnvironment::new();
    let conversation = env.conversation(agendar_flow());
    let sender = Sender::new(USER, -100_200);
    let bot = Some("tallerbot");

    conversation.start(USER).unwrap();
    for answer in answers() {
        let text = format!("@tallerbot {}", answer);
        conversation
            .handle_text(sender, strip_bot_mention(&text, bot), &es())
            .unwrap();
    }
    let reply = conversation
        .handle_text(sender, strip_bot_mention("@tallerbot Sí", bot), &es())
        .unwrap()
        .unwrap();
    assert!(reply.contains("#1"), "reply: {}", reply);

    let conn = get_connection(&env.pool).unwrap();
    let job = get_job(&conn, 1).unwrap().unwrap();
    assert_eq!(job.customer_name.as_deref(), Some("Jane Doe"));
    assert_eq!(job.telegram_chat_id, -100_200);
}
