use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::status::PollSettings;

/// Tool configuration, independent of any single descriptor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub aws: AwsSettings,
    pub poll: PollConfig,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AwsSettings {
    /// Region; falls back to the ambient AWS configuration when unset
    pub region: Option<String>,
    /// Named credentials profile
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    /// Seconds between cluster state polls
    pub interval_seconds: u64,
    /// Seconds before giving up on a deployment becoming reachable
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSettings {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
    pub file_enabled: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            aws: AwsSettings {
                region: None,
                profile: None,
            },
            poll: PollConfig {
                interval_seconds: 5,
                timeout_seconds: 300,
            },
            log: LogSettings {
                level: Some("info".to_string()),
                dir: None,
                file_enabled: Some(false),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the first candidate file found,
    /// then FARGATE_* environment overrides.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder();

        let defaults = AppConfig::default();
        settings = settings.add_source(
            config::Config::try_from(&defaults).map_err(|e| Error::Config(e.to_string()))?,
        );

        let config_paths = [
            "fargate-deploy.toml",
            "config.toml",
            "config/fargate-deploy.toml",
        ];

        for path in &config_paths {
            if std::path::Path::new(path).exists() {
                settings = settings.add_source(config::File::with_name(path));
                break;
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("FARGATE")
                .separator("_")
                .try_parsing(true),
        );

        let mut config: AppConfig = settings
            .build()
            .map_err(|e| Error::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Multi-word keys do not survive the env separator, so map the
        // common ones directly
        if let Ok(region) = std::env::var("FARGATE_REGION") {
            config.aws.region = Some(region);
        }
        if let Ok(profile) = std::env::var("FARGATE_PROFILE") {
            config.aws.profile = Some(profile);
        }
        if let Ok(interval) = std::env::var("FARGATE_POLL_INTERVAL") {
            config.poll.interval_seconds = interval
                .parse()
                .map_err(|_| Error::Config(format!("Bad FARGATE_POLL_INTERVAL: {}", interval)))?;
        }
        if let Ok(timeout) = std::env::var("FARGATE_POLL_TIMEOUT") {
            config.poll.timeout_seconds = timeout
                .parse()
                .map_err(|_| Error::Config(format!("Bad FARGATE_POLL_TIMEOUT: {}", timeout)))?;
        }
        if let Ok(level) = std::env::var("FARGATE_LOG_LEVEL") {
            config.log.level = Some(level);
        }

        if config.poll.interval_seconds == 0 {
            return Err(Error::Config("poll interval must be at least 1s".to_string()));
        }

        Ok(config)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll.interval_seconds),
            timeout: Duration::from_secs(self.poll.timeout_seconds),
        }
    }
}
