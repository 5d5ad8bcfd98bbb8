//! Shared fixtures for the integration tests
//!
//! A migrated temporary SQLite database, the shipped `flows/agendar.yaml`
//! flow and the Spanish locale the conversations are asserted against.

pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{agendar_flow, es, TestEnvironment};
