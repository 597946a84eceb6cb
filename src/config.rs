//! Configuration management for Gatekeeper.
//!
//! Configuration comes from an optional YAML file, overridden by environment
//! variables of the form `GATEKEEPER__RATE_LIMITING__MAX_REQUESTS=50`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{Policy, PolicyRule, PolicyTable, RulesConfig};

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP sidecar address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Default sliding window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Default requests admitted per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Default block duration in milliseconds
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// Seconds between background sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds of inactivity after which a violation streak is forgotten
    #[serde(default = "default_staleness_horizon")]
    pub staleness_horizon_secs: u64,

    /// Path to endpoint policy rules
    #[serde(default)]
    pub rules_path: Option<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            block_ms: default_block_ms(),
            sweep_interval_secs: default_sweep_interval(),
            staleness_horizon_secs: default_staleness_horizon(),
            rules_path: None,
        }
    }
}

fn default_window_ms() -> u64 {
    15 * 60 * 1000
}

fn default_max_requests() -> u32 {
    100
}

fn default_block_ms() -> u64 {
    5 * 60 * 1000
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_staleness_horizon() -> u64 {
    3600
}

impl RateLimitingConfig {
    /// The configured default policy.
    pub fn default_policy(&self) -> Result<Policy> {
        Policy::try_from(PolicyRule {
            window_ms: self.window_ms,
            max_requests: self.max_requests,
            block_ms: self.block_ms,
        })
    }

    /// The endpoint policy table: the rules file if configured, otherwise the
    /// built-in table around the configured default.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        let default = self.default_policy()?;
        match &self.rules_path {
            Some(path) => PolicyTable::from_rules(&RulesConfig::from_file(path)?, default),
            None => Ok(PolicyTable::new(default)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn staleness_horizon(&self) -> Duration {
        Duration::from_secs(self.staleness_horizon_secs)
    }

    fn validate(&self) -> Result<()> {
        self.default_policy()?;
        if self.sweep_interval_secs == 0 {
            return Err(GatekeeperError::Config(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatekeeperConfig {
    /// Load configuration from an optional file layered under environment
    /// overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: GatekeeperConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()
    }
}
