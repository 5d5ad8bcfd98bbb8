//! Checks on the shipped flow document
//!
//! Run with: cargo test --test flow_file_test

mod common;

use common::agendar_flow;
use pretty_assertions::assert_eq;
use tallerbot::flow::{NextStep, Transition, COMMIT_KEY};
use tallerbot::storage::jobs::fields;

#[test]
fn every_reference_resolves() {
    let flow = agendar_flow();

    assert_eq!(flow.unresolved_references(), Vec::new());
    assert_eq!(flow.initial_step(), "AWAIT_NAME");
    assert_eq!(flow.affirmative(), "sí");
    assert!(flow.commit_prompt().is_some());
    assert!(flow.cancel_prompt().is_some());
}

#[test]
fn collects_every_job_field_before_confirmation() {
    let flow = agendar_flow();
    let mut collected = Vec::new();
    let mut key = flow.initial_step().to_string();

    loop {
        let step = flow.step(&key).expect("step exists");
        match &step.transition {
            Transition::To(NextStep::Continue(next)) => {
                collected.extend(step.persist_as.clone());
                key = next.clone();
            }
            Transition::Confirm { positive, negative } => {
                assert_eq!(positive, &NextStep::Commit);
                assert_eq!(negative, &NextStep::Cancel);
                break;
            }
            other => panic!("unexpected transition from {}: {:?}", key, other),
        }
    }

    assert_eq!(
        collected,
        vec![
            fields::CUSTOMER_NAME,
            fields::CUSTOMER_PHONE,
            fields::VEHICLE_MAKE_MODEL,
            fields::PROBLEM_DESCRIPTION,
            fields::SCHEDULED_DATE,
        ]
    );
    assert!(flow.step(COMMIT_KEY).is_none());
}
