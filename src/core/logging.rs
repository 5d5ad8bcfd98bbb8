//! Logger initialization (console + file)

use anyhow::Result;
use simplelog::*;
use std::fs::OpenOptions;
use std::str::FromStr;

/// Parses a LOG_LEVEL value; unknown values fall back to `Info`.
pub fn parse_level(raw: &str) -> LevelFilter {
    LevelFilter::from_str(raw.trim()).unwrap_or(LevelFilter::Info)
}

/// Initialize logger for both console and file output
///
/// The log file is appended to, so restarts keep earlier history.
///
/// # Errors
/// Fails if the file cannot be opened or a logger is already installed.
pub fn init_logger(log_file_path: &str, level: LevelFilter) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file_path, e))?;

    let config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, config, log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("loud"), LevelFilter::Info);
    }

    #[test]
    fn test_init_logger_creates_log_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        // A second init in the same test binary fails; either way the file exists.
        let _ = init_logger(path, LevelFilter::Info);

        assert!(temp_file.path().exists());
    }
}
