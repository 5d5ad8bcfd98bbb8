use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;
use strum::{AsRefStr, EnumString};

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Custom Bot API server (e.g. a local telegram-bot-api instance)
/// Read from BOT_API_URL environment variable
pub static BOT_API_URL: Lazy<Option<String>> =
    Lazy::new(|| env::var("BOT_API_URL").ok().filter(|url| !url.trim().is_empty()));

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: tallerbot.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "tallerbot.sqlite".to_string()));

/// Booking flow document
/// Read from FLOW_FILE_PATH environment variable
/// Default: flows/agendar.yaml
pub static FLOW_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("FLOW_FILE_PATH").unwrap_or_else(|_| "flows/agendar.yaml".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: tallerbot.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "tallerbot.log".to_string()));

/// Log level (error, warn, info, debug, trace)
/// Read from LOG_LEVEL environment variable
/// Default: info
pub static LOG_LEVEL: Lazy<String> = Lazy::new(|| env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));

/// Where conversation sessions live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SessionBackend {
    /// Survives restarts
    #[default]
    Sqlite,
    /// Lost on restart; for local runs and tests
    Memory,
}

impl SessionBackend {
    fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Self::default(),
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Unknown SESSION_BACKEND '{}', using sqlite", raw);
                Self::default()
            }),
        }
    }
}

/// Read from SESSION_BACKEND environment variable (sqlite | memory)
/// Default: sqlite
pub static SESSION_BACKEND: Lazy<SessionBackend> =
    Lazy::new(|| SessionBackend::parse_or_default(env::var("SESSION_BACKEND").ok().as_deref()));

/// Staff configuration
pub mod staff {
    use once_cell::sync::Lazy;
    use std::env;

    pub(crate) fn parse_staff_ids(raw: &str) -> Vec<i64> {
        raw.split([',', ' ', '\n', '\t'])
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect()
    }

    /// Telegram user IDs allowed to run staff commands (comma-separated)
    /// Read from STAFF_IDS environment variable
    /// Empty means nobody is staff
    pub static STAFF_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("STAFF_IDS")
            .ok()
            .map(|raw| parse_staff_ids(&raw))
            .unwrap_or_default()
    });
}

/// Job listing configuration
pub mod jobs {
    /// Rows shown by /trabajos
    pub const LIST_LIMIT: usize = 20;

    /// Rows shown by /mistrabajos
    pub const CUSTOMER_LIST_LIMIT: usize = 10;
}

/// Startup retry configuration
pub mod retry {
    use super::Duration;

    /// Attempts at reaching the Bot API before giving up
    pub const MAX_STARTUP_ATTEMPTS: u32 = 5;

    /// Base delay between startup attempts (in seconds)
    pub const STARTUP_RETRY_DELAY_SECS: u64 = 2;

    /// Exponential backoff base
    pub const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

    /// Delay before attempt `attempt` (1-based)
    pub fn startup_delay(attempt: u32) -> Duration {
        let exp = EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1));
        Duration::from_secs(STARTUP_RETRY_DELAY_SECS.saturating_mul(exp))
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Timeout for Bot API requests (in seconds)
    /// Long polling holds a request open, so this must exceed the polling timeout
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}
