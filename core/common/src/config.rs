// core/common/src/config.rs
// Environment-driven configuration for the artifact probe

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::Invalid {
                key: "RUNLOG_ENVIRONMENT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub environment: Environment,
    pub artifact_dir: PathBuf,
    pub world_size: usize,
    pub max_attempts: u32,
    pub backoff_unit_ms: u64,
    pub rank_zero_only: bool,
    pub log_format: LogFormat,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            artifact_dir: std::env::temp_dir().join("runlog-artifacts"),
            world_size: 2,
            max_attempts: 6,
            backoff_unit_ms: 1000,
            rank_zero_only: false,
            log_format: LogFormat::Json,
        }
    }
}

impl ProbeConfig {
    /// Reads `RUNLOG_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let environment = match lookup("RUNLOG_ENVIRONMENT") {
            Some(value) => value.parse()?,
            None => defaults.environment,
        };

        let artifact_dir = lookup("RUNLOG_ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.artifact_dir);

        let world_size = parse_or(&lookup, "RUNLOG_WORLD_SIZE", defaults.world_size)?;
        if world_size == 0 {
            return Err(ConfigError::Invalid {
                key: "RUNLOG_WORLD_SIZE".to_string(),
                value: "0".to_string(),
            });
        }

        let log_format = match lookup("RUNLOG_LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("console") => LogFormat::Console,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "RUNLOG_LOG_FORMAT".to_string(),
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            environment,
            artifact_dir,
            world_size,
            max_attempts: parse_or(&lookup, "RUNLOG_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_unit_ms: parse_or(&lookup, "RUNLOG_BACKOFF_UNIT_MS", defaults.backoff_unit_ms)?,
            rank_zero_only: parse_or(&lookup, "RUNLOG_RANK_ZERO_ONLY", defaults.rank_zero_only)?,
            log_format,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_unit_ms))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
