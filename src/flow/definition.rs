//! Flow definition loading and validation
//!
//! The flow is written as a YAML document:
//!
//! ```yaml
//! initial_step: AWAIT_NAME
//! affirmative: "sí"
//! steps:
//!   AWAIT_NAME:
//!     prompt: "¿Cuál es tu nombre?"
//!     persist_as: customer_name
//!     transition_to: CONFIRMATION
//!   CONFIRMATION:
//!     prompt: "{customer_name}, ¿confirmas? (Sí/No)"
//!     transition_on_positive: __COMMIT__
//!     transition_on_negative: __CANCEL__
//!   __CANCEL__:
//!     prompt: "Cita cancelada."
//! ```
//!
//! Transition targets are resolved into `NextStep` once, when the document is
//! compiled into a `Flow`. The engine never compares against the reserved keys.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Reserved key: persist the collected answers as a job.
pub const COMMIT_KEY: &str = "__COMMIT__";

/// Reserved key: discard the collected answers. Its step only provides a prompt.
pub const CANCEL_KEY: &str = "__CANCEL__";

/// Affirmative answer used when the document does not declare one.
pub const DEFAULT_AFFIRMATIVE: &str = "sí";

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("failed to read flow file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid flow document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("initial step '{0}' is not an ordinary step of the flow")]
    UnknownInitialStep(String),

    #[error("step '{0}' mixes transition_to with confirmation branches")]
    MixedTransitions(String),

    #[error("step '{0}' declares only one confirmation branch")]
    IncompleteConfirmation(String),

    #[error("affirmative token must not be empty")]
    EmptyAffirmative,
}

/// Raw flow document as written in YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowDocument {
    pub initial_step: String,
    #[serde(default)]
    pub affirmative: Option<String>,
    pub steps: HashMap<String, StepDocument>,
}

/// Raw step as written in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepDocument {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub persist_as: Option<String>,
    #[serde(default)]
    pub transition_to: Option<String>,
    #[serde(default)]
    pub transition_on_positive: Option<String>,
    #[serde(default)]
    pub transition_on_negative: Option<String>,
}

/// Where a transition leads, resolved at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// An ordinary step of the flow.
    Continue(String),
    /// `__COMMIT__`
    Commit,
    /// `__CANCEL__`
    Cancel,
    /// The target is not defined (or the step declares no target at all).
    Unresolved(Option<String>),
}

impl NextStep {
    fn resolve(target: Option<&str>, steps: &HashMap<String, StepDocument>) -> Self {
        match target {
            Some(COMMIT_KEY) => NextStep::Commit,
            Some(CANCEL_KEY) => NextStep::Cancel,
            Some(key) if steps.contains_key(key) && !is_reserved(key) => NextStep::Continue(key.to_string()),
            other => NextStep::Unresolved(other.map(str::to_string)),
        }
    }
}

/// Transition rule of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Ordinary data-collection step.
    To(NextStep),
    /// Yes/no confirmation gate.
    Confirm { positive: NextStep, negative: NextStep },
}

/// One compiled node of the conversation graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStep {
    pub prompt: String,
    pub persist_as: Option<String>,
    pub transition: Transition,
}

impl FlowStep {
    pub fn is_confirmation(&self) -> bool {
        matches!(self.transition, Transition::Confirm { .. })
    }
}

/// Compiled, immutable flow shared by every conversation.
#[derive(Debug, Clone)]
pub struct Flow {
    initial_step: String,
    steps: HashMap<String, FlowStep>,
    cancel_prompt: Option<String>,
    commit_prompt: Option<String>,
    affirmative: String,
}

fn is_reserved(key: &str) -> bool {
    key == COMMIT_KEY || key == CANCEL_KEY
}

fn non_empty(prompt: &str) -> Option<String> {
    let trimmed = prompt.trim();
    (!trimmed.is_empty()).then(|| prompt.to_string())
}

impl Flow {
    /// Reads and compiles a flow file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| FlowError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let flow = Self::from_yaml_str(&raw)?;

        log::info!(
            "Loaded flow from {} ({} steps, initial step {})",
            path.display(),
            flow.steps.len(),
            flow.initial_step
        );
        for (step, target) in flow.unresolved_references() {
            match target {
                Some(target) => log::warn!("Flow step {} points to undefined step {}", step, target),
                None => log::warn!("Flow step {} has no transition", step),
            }
        }

        Ok(flow)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, FlowError> {
        let document: FlowDocument = serde_yaml::from_str(raw)?;
        Self::from_document(document)
    }

    /// Validates the document and resolves every transition target.
    pub fn from_document(document: FlowDocument) -> Result<Self, FlowError> {
        let affirmative = document
            .affirmative
            .as_deref()
            .unwrap_or(DEFAULT_AFFIRMATIVE)
            .trim()
            .to_lowercase();
        if affirmative.is_empty() {
            return Err(FlowError::EmptyAffirmative);
        }

        let mut steps = HashMap::with_capacity(document.steps.len());
        for (key, raw) in &document.steps {
            if is_reserved(key) {
                continue;
            }

            let transition = match (
                raw.transition_to.as_deref(),
                raw.transition_on_positive.as_deref(),
                raw.transition_on_negative.as_deref(),
            ) {
                (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                    return Err(FlowError::MixedTransitions(key.clone()));
                }
                (None, Some(positive), Some(negative)) => Transition::Confirm {
                    positive: NextStep::resolve(Some(positive), &document.steps),
                    negative: NextStep::resolve(Some(negative), &document.steps),
                },
                (None, Some(_), None) | (None, None, Some(_)) => {
                    return Err(FlowError::IncompleteConfirmation(key.clone()));
                }
                (target, None, None) => Transition::To(NextStep::resolve(target, &document.steps)),
            };

            steps.insert(
                key.clone(),
                FlowStep {
                    prompt: raw.prompt.clone(),
                    persist_as: raw.persist_as.clone().filter(|field| !field.trim().is_empty()),
                    transition,
                },
            );
        }

        if !steps.contains_key(&document.initial_step) {
            return Err(FlowError::UnknownInitialStep(document.initial_step));
        }

        let reserved_prompt = |key: &str| document.steps.get(key).and_then(|step| non_empty(&step.prompt));

        Ok(Self {
            cancel_prompt: reserved_prompt(CANCEL_KEY),
            commit_prompt: reserved_prompt(COMMIT_KEY),
            initial_step: document.initial_step,
            steps,
            affirmative,
        })
    }

    pub fn initial_step(&self) -> &str {
        &self.initial_step
    }

    pub fn step(&self, key: &str) -> Option<&FlowStep> {
        self.steps.get(key)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Prompt of the `__CANCEL__` step, if the document defines one.
    pub fn cancel_prompt(&self) -> Option<&str> {
        self.cancel_prompt.as_deref()
    }

    /// Prompt of the `__COMMIT__` step, if the document defines one.
    pub fn commit_prompt(&self) -> Option<&str> {
        self.commit_prompt.as_deref()
    }

    /// Lower-cased canonical affirmative answer.
    pub fn affirmative(&self) -> &str {
        &self.affirmative
    }

    /// Case-insensitive comparison against the single canonical affirmative token.
    pub fn is_affirmative(&self, input: &str) -> bool {
        input.trim().to_lowercase() == self.affirmative
    }

    /// Every (step, target) pair whose target does not resolve, sorted by step key.
    pub fn unresolved_references(&self) -> Vec<(String, Option<String>)> {
        let mut found: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();
        for (key, step) in &self.steps {
            let targets: Vec<&NextStep> = match &step.transition {
                Transition::To(next) => vec![next],
                Transition::Confirm { positive, negative } => vec![positive, negative],
            };
            for next in targets {
                if let NextStep::Unresolved(target) = next {
                    found.entry(key.clone()).or_default().push(target.clone());
                }
            }
        }
        found
            .into_iter()
            .flat_map(|(key, targets)| targets.into_iter().map(move |target| (key.clone(), target)))
            .collect()
    }
}
