//! Conversation flow: the static step graph and the pure engine that walks it
//!
//! - `definition`: YAML flow document, validation, compiled `Flow`
//! - `engine`: `advance` state transition, session data, prompt rendering

pub mod definition;
pub mod engine;

pub use definition::{Flow, FlowError, FlowStep, NextStep, Transition, CANCEL_KEY, COMMIT_KEY, DEFAULT_AFFIRMATIVE};
pub use engine::{advance, render_prompt, start, Action, Advance, FlowData, SessionData};
