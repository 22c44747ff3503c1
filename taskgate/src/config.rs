use intake::config::{Config as IntakeConfig, ConfigError as IntakeConfigError};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub intake: IntakeConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let mut config: Config = serde_yaml::from_reader(file)?;
        config.intake = config.intake.with_env_overrides();

        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let metrics = match (lookup("STATSD_HOST"), lookup("STATSD_PORT")) {
            (Some(statsd_host), port) => Some(MetricsConfig {
                statsd_host,
                statsd_port: match port {
                    Some(port) => port
                        .parse()
                        .map_err(|_| ConfigError::InvalidStatsdPort(port))?,
                    None => 8125,
                },
            }),
            (None, _) => None,
        };
        let logging = lookup("SENTRY_DSN").map(|sentry_dsn| LoggingConfig { sentry_dsn });

        Ok(Config {
            common: CommonConfig { metrics, logging },
            intake: IntakeConfig::from_lookup(lookup)?,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid STATSD_PORT: {0}")]
    InvalidStatsdPort(String),
    #[error(transparent)]
    Intake(#[from] IntakeConfigError),
}
