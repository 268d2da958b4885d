use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// Log output settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for the rolling log file
    pub log_dir: PathBuf,
    /// Console output enabled
    pub console_enabled: bool,
    /// File output enabled
    pub file_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            console_enabled: true,
            file_enabled: false,
        }
    }
}

impl LogConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut log_config = Self::default();
        if let Some(ref level) = config.log.level {
            log_config.level = level.clone();
        }
        if let Some(ref dir) = config.log.dir {
            log_config.log_dir = dir.clone();
        }
        if let Some(file_enabled) = config.log.file_enabled {
            log_config.file_enabled = file_enabled;
        }
        log_config
    }
}

fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// Returns the appender's worker guard when file output is on; the caller
/// must keep it alive for the process lifetime or buffered log lines are
/// lost on exit.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.file_enabled {
        ensure_log_dir(&config.log_dir)?;
        let file_appender = rolling::daily(&config.log_dir, "fargate-deploy.log");
        let (non_blocking, guard) = non_blocking(file_appender);

        if config.console_enabled {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr.and(non_blocking))
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .init();
        }
        return Ok(Some(guard));
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
    }

    #[test]
    fn test_from_app_config() {
        let mut app = AppConfig::default();
        app.log.level = Some("debug".to_string());
        app.log.file_enabled = Some(true);

        let config = LogConfig::from_app_config(&app);
        assert_eq!(config.level, "debug");
        assert!(config.file_enabled);
    }

    #[test]
    fn test_ensure_log_dir() {
        let temp_dir = tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");
        assert!(ensure_log_dir(&log_dir).is_ok());
        assert!(log_dir.exists());
    }
}
