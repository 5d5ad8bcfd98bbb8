//! Flow engine: pure state transitions over a compiled `Flow`
//!
//! `advance` never performs I/O. The caller persists the returned session and
//! then interprets the returned `Action`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::definition::{Flow, NextStep, Transition};

/// Collected answers, keyed by the step's `persist_as` field name.
pub type FlowData = BTreeMap<String, String>;

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex"));

/// Per-user conversation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// `None` means there is no active conversation.
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub flow_data: FlowData,
}

impl SessionData {
    pub fn is_active(&self) -> bool {
        self.current_step.is_some()
    }
}

/// What the orchestration layer must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reply with the next step's rendered prompt.
    Prompt(String),
    /// Persist the snapshot as a job.
    Commit(FlowData),
    /// Reply with the `__CANCEL__` prompt, if the flow defines one.
    Cancel(Option<String>),
    /// Ignore the message.
    Noop,
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub session: SessionData,
    pub action: Action,
}

impl Advance {
    fn passthrough(session: &SessionData) -> Self {
        Self {
            session: session.clone(),
            action: Action::Noop,
        }
    }
}

/// Replaces every `{field}` with the collected value; unknown fields become "".
pub fn render_prompt(template: &str, data: &FlowData) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures<'_>| {
            data.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Fresh session positioned at the initial step, with its prompt.
pub fn start(flow: &Flow) -> Advance {
    let session = SessionData {
        current_step: Some(flow.initial_step().to_string()),
        flow_data: FlowData::new(),
    };
    let prompt = flow
        .step(flow.initial_step())
        .map(|step| render_prompt(&step.prompt, &session.flow_data))
        .unwrap_or_default();

    Advance {
        session,
        action: Action::Prompt(prompt),
    }
}

/// Computes the next session and action for one line of user input.
pub fn advance(flow: &Flow, session: &SessionData, raw_input: &str) -> Advance {
    let Some(current_key) = session.current_step.as_deref() else {
        return Advance::passthrough(session);
    };
    let Some(current) = flow.step(current_key) else {
        return Advance::passthrough(session);
    };

    let input = raw_input.trim();
    let mut flow_data = session.flow_data.clone();

    let next = match &current.transition {
        Transition::Confirm { positive, negative } => {
            if flow.is_affirmative(input) {
                positive
            } else {
                negative
            }
        }
        Transition::To(next) => {
            if let Some(field) = &current.persist_as {
                flow_data.insert(field.clone(), input.to_string());
            }
            next
        }
    };

    match next {
        NextStep::Commit => Advance {
            session: SessionData::default(),
            action: Action::Commit(flow_data),
        },
        NextStep::Cancel => Advance {
            session: SessionData::default(),
            action: Action::Cancel(flow.cancel_prompt().map(str::to_string)),
        },
        NextStep::Continue(key) => match flow.step(key) {
            Some(step) => {
                let prompt = render_prompt(&step.prompt, &flow_data);
                Advance {
                    session: SessionData {
                        current_step: Some(key.clone()),
                        flow_data,
                    },
                    action: Action::Prompt(prompt),
                }
            }
            None => unresolved(Some(key.clone()), flow_data),
        },
        NextStep::Unresolved(key) => unresolved(key.clone(), flow_data),
    }
}

fn unresolved(key: Option<String>, flow_data: FlowData) -> Advance {
    Advance {
        session: SessionData {
            current_step: key,
            flow_data,
        },
        action: Action::Noop,
    }
}
