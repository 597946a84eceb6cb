//! Endpoint policy rules and resolution.
//!
//! Endpoints are grouped into a small closed set of classes, each class
//! carrying one policy. The mapping is resolved once when a [`PolicyTable`]
//! is built, so the admission path does a single map lookup per check.
//!
//! Rules can be loaded from YAML:
//!
//! ```yaml
//! default:
//!   window_ms: 900000
//!   max_requests: 100
//!   block_ms: 300000
//! classes:
//!   authentication:
//!     window_ms: 900000
//!     max_requests: 5
//!     block_ms: 900000
//! endpoints:
//!   login: authentication
//!   reports: bulk_read
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::policy::{Policy, PolicyRule};
use crate::error::{GatekeeperError, Result};

/// Endpoints that authenticate or create accounts.
const AUTHENTICATION_ENDPOINTS: &[&str] = &["login", "signup", "register", "password-reset", "verify-otp"];
/// Endpoints that mutate data.
const WRITE_ENDPOINTS: &[&str] = &["create", "update", "delete", "import"];
/// Read-only listing endpoints.
const BULK_READ_ENDPOINTS: &[&str] = &["list", "search", "export", "dashboard"];

/// Class of endpoint, each with its own policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    /// Login, signup and similar credential-bearing endpoints
    Authentication,
    /// Endpoints that create, change or delete data
    Write,
    /// High-volume read-only endpoints
    BulkRead,
    /// Anything not registered; uses the default policy
    Standard,
}

impl EndpointClass {
    /// Built-in policy for this class.
    ///
    /// `Standard` has no built-in policy of its own: it always follows the
    /// table default.
    fn builtin_policy(&self, default: Policy) -> Policy {
        let (window, max_requests, block) = match self {
            EndpointClass::Authentication => (15 * 60, 5, 15 * 60),
            EndpointClass::Write => (60, 30, 5 * 60),
            EndpointClass::BulkRead => (60, 300, 60),
            EndpointClass::Standard => return default,
        };
        Policy::new(
            Duration::from_secs(window),
            max_requests,
            Duration::from_secs(block),
        )
        .unwrap_or(default)
    }
}

/// Rules file contents. Everything is layered over the built-in table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Policy for unregistered endpoints and plain `check_limit` calls
    #[serde(default)]
    pub default: Option<PolicyRule>,
    /// Per-class policies
    #[serde(default)]
    pub classes: HashMap<EndpointClass, PolicyRule>,
    /// Endpoint name to class
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointClass>,
}

impl RulesConfig {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading endpoint policy rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse policy rules: {}", e)))
    }
}

/// An endpoint's class together with the policy it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub class: EndpointClass,
    pub policy: Policy,
}

/// Read-only mapping from endpoint name to policy.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    default: Policy,
    classes: HashMap<EndpointClass, Policy>,
    endpoints: HashMap<String, ResolvedEndpoint>,
}

impl PolicyTable {
    /// The built-in table with the given default policy.
    pub fn new(default: Policy) -> Self {
        let classes = [
            EndpointClass::Authentication,
            EndpointClass::Write,
            EndpointClass::BulkRead,
        ]
        .into_iter()
        .map(|class| (class, class.builtin_policy(default)))
        .collect();

        let mut table = Self {
            default,
            classes,
            endpoints: HashMap::new(),
        };
        for (names, class) in [
            (AUTHENTICATION_ENDPOINTS, EndpointClass::Authentication),
            (WRITE_ENDPOINTS, EndpointClass::Write),
            (BULK_READ_ENDPOINTS, EndpointClass::BulkRead),
        ] {
            for name in names {
                table.register(name, class);
            }
        }
        table
    }

    /// The built-in table with the built-in default policy.
    pub fn builtin() -> Self {
        Self::new(Policy::default())
    }

    /// Build a table from rules layered over the built-in one.
    ///
    /// `fallback_default` is used when the rules do not set `default`.
    pub fn from_rules(rules: &RulesConfig, fallback_default: Policy) -> Result<Self> {
        let default = match rules.default {
            Some(rule) => Policy::try_from(rule)?,
            None => fallback_default,
        };
        let mut table = Self::new(default);

        for (class, rule) in &rules.classes {
            if *class == EndpointClass::Standard {
                return Err(GatekeeperError::Config(
                    "the standard class follows `default`; set that instead".to_string(),
                ));
            }
            table.classes.insert(*class, Policy::try_from(*rule)?);
        }

        // Re-resolve built-in endpoints against overridden class policies.
        let builtin: Vec<(String, EndpointClass)> = table
            .endpoints
            .iter()
            .map(|(name, resolved)| (name.clone(), resolved.class))
            .collect();
        for (name, class) in builtin {
            table.register(&name, class);
        }

        for (name, class) in &rules.endpoints {
            if normalize_endpoint(name).is_empty() {
                return Err(GatekeeperError::Config(
                    "endpoint names must not be empty".to_string(),
                ));
            }
            table.register(name, *class);
        }

        info!(
            endpoints = table.endpoints.len(),
            default_max_requests = table.default.max_requests(),
            "Endpoint policy table built"
        );
        Ok(table)
    }

    fn register(&mut self, endpoint: &str, class: EndpointClass) {
        let policy = self.class_policy(class);
        self.endpoints
            .insert(normalize_endpoint(endpoint), ResolvedEndpoint { class, policy });
    }

    /// Policy for plain, endpoint-less checks.
    pub fn default_policy(&self) -> Policy {
        self.default
    }

    /// Policy currently assigned to a class.
    pub fn class_policy(&self, class: EndpointClass) -> Policy {
        match class {
            EndpointClass::Standard => self.default,
            _ => self.classes.get(&class).copied().unwrap_or(self.default),
        }
    }

    /// Resolve an endpoint name; unknown endpoints get the default policy.
    pub fn resolve(&self, endpoint: &str) -> ResolvedEndpoint {
        self.endpoints
            .get(&normalize_endpoint(endpoint))
            .copied()
            .unwrap_or(ResolvedEndpoint {
                class: EndpointClass::Standard,
                policy: self.default,
            })
    }

    /// Snapshot of the table in rules-file form.
    pub fn to_rules(&self) -> RulesConfig {
        RulesConfig {
            default: Some(self.default.into()),
            classes: self
                .classes
                .iter()
                .map(|(class, policy)| (*class, PolicyRule::from(*policy)))
                .collect(),
            endpoints: self
                .endpoints
                .iter()
                .map(|(name, resolved)| (name.clone(), resolved.class))
                .collect(),
        }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Canonical form of an endpoint name, used both for lookup and for keys.
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().to_ascii_lowercase()
}
