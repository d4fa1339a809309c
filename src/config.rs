//! Configuration management for Turnstile.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};
use crate::policy::PolicyTable;
use crate::ratelimit::RateLimiter;

/// Prefix for environment overrides, e.g. `TURNSTILE__LIMITER__MAX_ENTRIES`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    /// Limiter sizing and housekeeping
    pub limiter: LimiterConfig,

    /// Path to a YAML file of per-action policy overrides
    pub policies_path: Option<String>,

    /// Log output
    pub logging: LoggingConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum number of tracked keys, 0 for unbounded
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// How often expired entries are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_max_entries() -> usize {
    100_000
}

fn default_sweep_interval() -> u64 {
    60
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `TURNSTILE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TurnstileConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig =
            serde_yaml::from_str::<Option<TurnstileConfig>>(yaml)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.limiter.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "limiter.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Sweep period as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.limiter.sweep_interval_secs)
    }

    /// Policies in effect: defaults plus the overrides file, if configured.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        match &self.policies_path {
            Some(path) => PolicyTable::from_file(path),
            None => Ok(PolicyTable::defaults()),
        }
    }

    /// A system-clock limiter sized per this configuration.
    pub fn build_limiter(&self) -> RateLimiter {
        RateLimiter::new().with_max_entries(self.limiter.max_entries)
    }
}
