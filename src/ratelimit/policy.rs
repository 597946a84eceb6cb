//! Rate limit policies and partial overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GatekeeperError, Result};

/// Default sliding window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;
/// Default block applied after escalation.
pub const DEFAULT_BLOCK: Duration = Duration::from_secs(5 * 60);
/// Longest window or block a policy may carry.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A validated sliding-window policy.
///
/// Every field is strictly positive and durations are capped at
/// [`MAX_DURATION`]; a `Policy` cannot be built otherwise, so admission
/// checks never have to handle a degenerate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    window: Duration,
    max_requests: u32,
    block_duration: Duration,
}

impl Policy {
    /// Consecutive denials after which a key is blocked.
    pub const ESCALATION_THRESHOLD: u32 = 3;

    /// Create a policy, rejecting zero values and durations over
    /// [`MAX_DURATION`].
    pub fn new(window: Duration, max_requests: u32, block_duration: Duration) -> Result<Self> {
        check_duration("window", window)?;
        check_limit(max_requests)?;
        check_duration("block duration", block_duration)?;
        Ok(Self {
            window,
            max_requests,
            block_duration,
        })
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// How long a key stays blocked once escalated.
    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    pub(crate) fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub(crate) fn block_ms(&self) -> u64 {
        self.block_duration.as_millis() as u64
    }

    /// Apply the fields present in `overrides`, keeping ours for the rest.
    pub fn merge(&self, overrides: &PolicyOverride) -> Policy {
        Policy {
            window: overrides.window.unwrap_or(self.window),
            max_requests: overrides.max_requests.unwrap_or(self.max_requests),
            block_duration: overrides.block_duration.unwrap_or(self.block_duration),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
            block_duration: DEFAULT_BLOCK,
        }
    }
}

/// A partial policy merged over a base policy at check time.
///
/// Each field is validated as it is set, so merging can never produce an
/// invalid [`Policy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverride {
    window: Option<Duration>,
    max_requests: Option<u32>,
    block_duration: Option<Duration>,
}

impl PolicyOverride {
    /// An override that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: Duration) -> Result<Self> {
        check_duration("window", window)?;
        self.window = Some(window);
        Ok(self)
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Result<Self> {
        check_limit(max_requests)?;
        self.max_requests = Some(max_requests);
        Ok(self)
    }

    pub fn with_block_duration(mut self, block_duration: Duration) -> Result<Self> {
        check_duration("block duration", block_duration)?;
        self.block_duration = Some(block_duration);
        Ok(self)
    }
}

/// Serialized form of a policy, as found in rules files and API payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per window
    pub max_requests: u32,
    /// Block duration in milliseconds
    pub block_ms: u64,
}

impl TryFrom<PolicyRule> for Policy {
    type Error = GatekeeperError;

    fn try_from(rule: PolicyRule) -> Result<Self> {
        Policy::new(
            Duration::from_millis(rule.window_ms),
            rule.max_requests,
            Duration::from_millis(rule.block_ms),
        )
    }
}

impl From<Policy> for PolicyRule {
    fn from(policy: Policy) -> Self {
        Self {
            window_ms: policy.window_ms(),
            max_requests: policy.max_requests,
            block_ms: policy.block_ms(),
        }
    }
}

/// Serialized form of a [`PolicyOverride`]; every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRule {
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub max_requests: Option<u32>,
    #[serde(default)]
    pub block_ms: Option<u64>,
}

impl TryFrom<OverrideRule> for PolicyOverride {
    type Error = GatekeeperError;

    fn try_from(rule: OverrideRule) -> Result<Self> {
        let mut overrides = PolicyOverride::new();
        if let Some(ms) = rule.window_ms {
            overrides = overrides.with_window(Duration::from_millis(ms))?;
        }
        if let Some(max) = rule.max_requests {
            overrides = overrides.with_max_requests(max)?;
        }
        if let Some(ms) = rule.block_ms {
            overrides = overrides.with_block_duration(Duration::from_millis(ms))?;
        }
        Ok(overrides)
    }
}

// Timestamps are whole milliseconds, so anything shorter rounds to zero.
fn check_duration(field: &str, value: Duration) -> Result<()> {
    if value.as_millis() == 0 {
        return Err(GatekeeperError::InvalidPolicy(format!(
            "{} must be at least 1ms, got {:?}",
            field, value
        )));
    }
    if value > MAX_DURATION {
        return Err(GatekeeperError::InvalidPolicy(format!(
            "{} must be at most {:?}, got {:?}",
            field, MAX_DURATION, value
        )));
    }
    Ok(())
}

fn check_limit(max_requests: u32) -> Result<()> {
    if max_requests == 0 {
        return Err(GatekeeperError::InvalidPolicy(
            "max_requests must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
