use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

const DEFAULT_PATH: &str = "/api/build";
const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Secret cannot be empty")]
    EmptySecret,

    #[error("Endpoint path must start with '/': {0}")]
    InvalidPath(String),

    #[error("Queue path cannot be empty")]
    EmptyQueuePath,

    #[error("Forward timeout cannot be 0")]
    InvalidTimeout,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("missing environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("WORKER_URL and QUEUE_FILE are both set, only one sink can be configured")]
    ConflictingSinks,

    #[error("neither WORKER_URL nor QUEUE_FILE is set")]
    NoSink,
}

/// Intake gateway configuration
///
/// Built once at startup and shared read-only with the request handler.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for task submissions
    #[serde(default)]
    pub listener: Listener,
    /// Path of the single intake endpoint
    #[serde(default = "default_path")]
    pub path: String,
    /// Shared secret every submission must present
    ///
    /// May be left out of the file and supplied through `SECRET_CODE`.
    #[serde(default)]
    pub secret: String,
    /// Where accepted tasks are handed off
    pub sink: SinkConfig,
}

fn default_path() -> String {
    DEFAULT_PATH.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_FORWARD_TIMEOUT_SECS
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Downstream sink for accepted tasks. Exactly one is active per process.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum SinkConfig {
    /// Relay the raw request body to a worker endpoint
    Forward {
        url: Url,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Append a record to a JSON array file
    Queue { path: PathBuf },
}

impl SinkConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Forward { .. } => "forward",
            SinkConfig::Queue { .. } => "queue",
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SinkConfig::Forward { timeout_secs, .. } if *timeout_secs == 0 => {
                Err(ValidationError::InvalidTimeout)
            }
            SinkConfig::Queue { path } if path.as_os_str().is_empty() => {
                Err(ValidationError::EmptyQueuePath)
            }
            _ => Ok(()),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Builds the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup.
    ///
    /// Recognized variables: `SECRET_CODE`, `WORKER_URL`, `WORKER_TIMEOUT_SECS`,
    /// `QUEUE_FILE`, `HOST`, `PORT`, `INTAKE_PATH`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("SECRET_CODE").ok_or(ConfigError::MissingVar("SECRET_CODE"))?;

        let sink = match (lookup("WORKER_URL"), lookup("QUEUE_FILE")) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSinks),
            (Some(url), None) => {
                let url = Url::parse(&url).map_err(|e| ConfigError::InvalidVar {
                    var: "WORKER_URL",
                    reason: e.to_string(),
                })?;
                let timeout_secs = match lookup("WORKER_TIMEOUT_SECS") {
                    Some(value) => parse_var("WORKER_TIMEOUT_SECS", &value)?,
                    None => DEFAULT_FORWARD_TIMEOUT_SECS,
                };
                SinkConfig::Forward { url, timeout_secs }
            }
            (None, Some(path)) => SinkConfig::Queue { path: path.into() },
            (None, None) => return Err(ConfigError::NoSink),
        };

        let mut listener = Listener::default();
        if let Some(host) = lookup("HOST") {
            listener.host = host;
        }
        if let Some(port) = lookup("PORT") {
            listener.port = parse_var("PORT", &port)?;
        }

        Ok(Config {
            listener,
            path: lookup("INTAKE_PATH").unwrap_or_else(default_path),
            secret,
            sink,
        })
    }

    /// Replaces the file-provided secret with `SECRET_CODE` when it is set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("SECRET_CODE") {
            self.secret = secret;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;

        if self.secret.is_empty() {
            return Err(ValidationError::EmptySecret);
        }

        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }

        self.sink.validate()
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        var,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_forward_config() {
        let yaml = r#"
listener:
    host: "127.0.0.1"
    port: 8080
secret: "S"
sink:
    type: forward
    url: "http://worker.internal:9000/tasks"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.path, "/api/build");
        assert_eq!(
            config.sink,
            SinkConfig::Forward {
                url: Url::parse("http://worker.internal:9000/tasks").unwrap(),
                timeout_secs: 5,
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_queue_config() {
        let yaml = r#"
path: /tasks
secret: "S"
sink:
    type: queue
    path: /var/lib/taskgate/queue.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listener, Listener::default());
        assert_eq!(config.path, "/tasks");
        assert_eq!(config.sink.kind(), "queue");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_worker_url_rejected() {
        let yaml = r#"
sink:
    type: forward
    url: "not a url"
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_validation_errors() {
        let config = Config {
            listener: Listener::default(),
            path: default_path(),
            secret: "S".into(),
            sink: SinkConfig::Queue {
                path: "queue.json".into(),
            },
        };
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.secret = String::new();
        assert_eq!(bad.validate(), Err(ValidationError::EmptySecret));

        let mut bad = config.clone();
        bad.listener.port = 0;
        assert_eq!(bad.validate(), Err(ValidationError::InvalidPort));

        let mut bad = config.clone();
        bad.path = "api/build".into();
        assert_eq!(
            bad.validate(),
            Err(ValidationError::InvalidPath("api/build".into()))
        );

        let mut bad = config.clone();
        bad.sink = SinkConfig::Queue {
            path: PathBuf::new(),
        };
        assert_eq!(bad.validate(), Err(ValidationError::EmptyQueuePath));

        let mut bad = config;
        bad.sink = SinkConfig::Forward {
            url: Url::parse("http://127.0.0.1:9000").unwrap(),
            timeout_secs: 0,
        };
        assert_eq!(bad.validate(), Err(ValidationError::InvalidTimeout));
    }

    #[test]
    fn test_from_lookup_forward() {
        let config = Config::from_lookup(lookup_from(&[
            ("SECRET_CODE", "S"),
            ("WORKER_URL", "https://worker.example.com"),
            ("PORT", "8081"),
        ]))
        .unwrap();

        assert_eq!(config.secret, "S");
        assert_eq!(config.listener.port, 8081);
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(
            config.sink,
            SinkConfig::Forward {
                url: Url::parse("https://worker.example.com").unwrap(),
                timeout_secs: 5,
            }
        );
    }

    #[test]
    fn test_from_lookup_queue() {
        let config = Config::from_lookup(lookup_from(&[
            ("SECRET_CODE", "S"),
            ("QUEUE_FILE", "/tmp/queue.json"),
            ("INTAKE_PATH", "/submit"),
        ]))
        .unwrap();

        assert_eq!(config.path, "/submit");
        assert_eq!(
            config.sink,
            SinkConfig::Queue {
                path: "/tmp/queue.json".into()
            }
        );
    }

    #[test]
    fn test_from_lookup_errors() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("QUEUE_FILE", "q.json")])),
            Err(ConfigError::MissingVar("SECRET_CODE"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("SECRET_CODE", "S")])),
            Err(ConfigError::NoSink)
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("SECRET_CODE", "S"),
                ("QUEUE_FILE", "q.json"),
                ("WORKER_URL", "http://worker"),
            ])),
            Err(ConfigError::ConflictingSinks)
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("SECRET_CODE", "S"),
                ("QUEUE_FILE", "q.json"),
                ("PORT", "http"),
            ])),
            Err(ConfigError::InvalidVar { var: "PORT", .. })
        ));
    }

    #[test]
    fn test_secret_override() {
        let yaml = r#"
secret: from-file
sink:
    type: queue
    path: queue.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let config = config.with_overrides_from(lookup_from(&[("SECRET_CODE", "from-env")]));
        assert_eq!(config.secret, "from-env");

        let config = config.with_overrides_from(lookup_from(&[]));
        assert_eq!(config.secret, "from-env");
    }
}
