//! Test fixtures: a temporary database and the shipped booking flow

use std::path::PathBuf;
use std::sync::Arc;

use tallerbot::flow::Flow;
use tallerbot::storage::{create_pool, DbPool, SqliteJobLedger, SqliteSessionStore};
use tallerbot::{i18n, Conversation};
use tempfile::TempDir;
use unic_langid::LanguageIdentifier;

/// Path of a file relative to the crate root.
pub fn repo_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
}

/// The booking flow shipped in `flows/agendar.yaml`.
pub fn agendar_flow() -> Flow {
    Flow::load(repo_path("flows/agendar.yaml")).expect("flows/agendar.yaml should load")
}

pub fn es() -> LanguageIdentifier {
    i18n::lang_from_code("es")
}

/// A migrated SQLite database in a temporary directory.
pub struct TestEnvironment {
    _dir: TempDir,
    pub pool: Arc<DbPool>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tallerbot.sqlite");
        let pool = create_pool(path.to_str().expect("utf-8 path")).expect("pool");
        Self {
            _dir: dir,
            pool: Arc::new(pool),
        }
    }

    /// A conversation backed by this database; build twice to simulate a restart.
    pub fn conversation(&self, flow: Flow) -> Conversation {
        Conversation::new(
            Arc::new(flow),
            Arc::new(SqliteSessionStore::new(Arc::clone(&self.pool))),
            Arc::new(SqliteJobLedger::new(Arc::clone(&self.pool))),
        )
    }
}
