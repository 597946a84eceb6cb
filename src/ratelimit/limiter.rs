//! Core rate limiter implementation.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock};
use super::policy::{Policy, PolicyOverride};
use super::rules::{normalize_endpoint, PolicyTable};
use super::state::KeyState;
use crate::config::RateLimitingConfig;
use crate::error::{GatekeeperError, Result};

/// Default horizon after which an idle violation streak is forgotten.
pub const DEFAULT_STALENESS_HORIZON: Duration = Duration::from_secs(60 * 60);

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests still admissible in the current window
    pub remaining: u32,
    /// Epoch milliseconds at which capacity frees up or the block lifts
    pub reset_time: u64,
    /// Set when the key is blocked; how long the caller must wait
    pub retry_after: Option<Duration>,
}

impl AdmissionResult {
    fn blocked(until: u64, now: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_time: until,
            retry_after: Some(Duration::from_millis(until.saturating_sub(now))),
        }
    }
}

/// Point-in-time view of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub blocked: bool,
    pub blocked_until: Option<u64>,
    pub violation_count: u32,
    pub request_count: usize,
}

/// Aggregate counters for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub active_identifiers: usize,
    pub blocked_identifiers: usize,
    pub total_violations: u64,
}

/// What one [`RateLimiter::cleanup`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub evicted: usize,
    pub blocks_expired: usize,
    pub violations_reset: usize,
}

/// Sliding-window rate limiter with escalating blocks.
///
/// This struct is thread-safe and meant to be shared as `Arc<RateLimiter>`.
/// Key state lives in a sharded map: checks for the same key serialize on
/// that key's shard, checks for other keys proceed in parallel.
pub struct RateLimiter {
    /// Per-key state indexed by identifier or `identifier:endpoint`
    states: DashMap<String, KeyState>,
    /// Default and per-endpoint policies
    policies: RwLock<Arc<PolicyTable>>,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Idle time after which a violation streak is reset by the sweep
    staleness_horizon: Duration,
}

impl RateLimiter {
    /// Create a rate limiter over a policy table, using the system clock.
    pub fn new(policies: PolicyTable) -> Self {
        Self {
            states: DashMap::new(),
            policies: RwLock::new(Arc::new(policies)),
            clock: Arc::new(SystemClock),
            staleness_horizon: DEFAULT_STALENESS_HORIZON,
        }
    }

    /// Build a rate limiter from configuration, loading the rules file if one
    /// is configured.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        let policies = config.policy_table()?;
        Ok(Self::new(policies).with_staleness_horizon(config.staleness_horizon()))
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the violation staleness horizon.
    pub fn with_staleness_horizon(mut self, horizon: Duration) -> Self {
        self.staleness_horizon = horizon;
        self
    }

    /// Check and record a request under the default policy, optionally
    /// overridden field by field.
    pub fn check_limit(&self, identifier: &str, overrides: Option<&PolicyOverride>) -> AdmissionResult {
        let base = self.policies.read().default_policy();
        let policy = match overrides {
            Some(o) => base.merge(o),
            None => base,
        };
        self.evaluate(identifier.to_string(), &policy)
    }

    /// Check and record a request against a named endpoint.
    ///
    /// Quota is tracked under `identifier:endpoint`, so each endpoint has its
    /// own window for the same caller.
    pub fn check_endpoint(&self, identifier: &str, endpoint: &str) -> AdmissionResult {
        self.check_endpoint_with(identifier, endpoint, None)
    }

    /// Like [`check_endpoint`](Self::check_endpoint), with an override merged
    /// over the endpoint's policy.
    pub fn check_endpoint_with(
        &self,
        identifier: &str,
        endpoint: &str,
        overrides: Option<&PolicyOverride>,
    ) -> AdmissionResult {
        let endpoint = normalize_endpoint(endpoint);
        let resolved = self.policies.read().resolve(&endpoint);
        let policy = match overrides {
            Some(o) => resolved.policy.merge(o),
            None => resolved.policy,
        };

        trace!(
            identifier = %identifier,
            endpoint = %endpoint,
            class = ?resolved.class,
            "Resolved endpoint policy"
        );

        self.evaluate(endpoint_key(identifier, &endpoint), &policy)
    }

    fn evaluate(&self, key: String, policy: &Policy) -> AdmissionResult {
        debug_assert!(!key.is_empty(), "identifiers are validated by callers");

        let now = self.clock.now_millis();
        let max_requests = policy.max_requests();

        trace!(
            key = %key,
            max_requests = max_requests,
            window_ms = policy.window_ms(),
            "Checking rate limit"
        );

        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut state = self.states.entry(key).or_insert_with(|| {
            debug!(window_ms = policy.window_ms(), "Creating new rate limit state");
            KeyState::new(now, policy.window_ms())
        });
        state.touch(now, policy);

        if let Some(until) = state.active_block(now) {
            trace!(key = %state.key(), blocked_until = until, "Key is blocked");
            return AdmissionResult::blocked(until, now);
        }

        state.prune(now);
        let in_window = state.in_window() as u32;

        if in_window < max_requests {
            state.admit(now);
            return AdmissionResult {
                allowed: true,
                remaining: max_requests - in_window - 1,
                reset_time: state.window_reset(now),
                retry_after: None,
            };
        }

        match state.deny(now, policy) {
            Some(until) => {
                info!(
                    key = %state.key(),
                    blocked_until = until,
                    block_ms = policy.block_ms(),
                    "Rate limit violations escalated to block"
                );
                AdmissionResult {
                    allowed: false,
                    remaining: 0,
                    reset_time: until,
                    retry_after: Some(policy.block_duration()),
                }
            }
            None => {
                debug!(
                    key = %state.key(),
                    violations = state.violation_count(),
                    "Rate limit exceeded"
                );
                AdmissionResult {
                    allowed: false,
                    remaining: 0,
                    reset_time: state.window_reset(now),
                    retry_after: None,
                }
            }
        }
    }

    /// Forget one key, or every key when `identifier` is `None`.
    pub fn clear(&self, identifier: Option<&str>) {
        match identifier {
            Some(key) => {
                if self.states.remove(key).is_some() {
                    info!(key = %key, "Cleared rate limit state");
                }
            }
            None => {
                let count = self.states.len();
                self.states.clear();
                info!(count = count, "Cleared all rate limit state");
            }
        }
    }

    /// Whether `identifier` is blocked right now.
    pub fn is_blocked(&self, identifier: &str) -> bool {
        self.with_state(identifier, |state, now| state.active_block(now).is_some())
            .unwrap_or(false)
    }

    /// Current violation streak for `identifier`.
    pub fn violation_count(&self, identifier: &str) -> u32 {
        self.with_state(identifier, |state, now| {
            state.active_block(now);
            state.violation_count()
        })
        .unwrap_or(0)
    }

    /// Admitted requests inside the window last applied to `identifier`.
    pub fn request_count(&self, identifier: &str) -> usize {
        self.with_state(identifier, |state, now| {
            state.prune(now);
            state.in_window()
        })
        .unwrap_or(0)
    }

    /// All of the above in one lock acquisition; `None` for unknown keys.
    pub fn status(&self, identifier: &str) -> Option<KeyStatus> {
        self.with_state(identifier, |state, now| {
            let blocked_until = state.active_block(now);
            state.prune(now);
            KeyStatus {
                blocked: blocked_until.is_some(),
                blocked_until,
                violation_count: state.violation_count(),
                request_count: state.in_window(),
            }
        })
    }

    // Accessors apply lazy expiry, so they take the write side of the shard.
    fn with_state<T>(&self, identifier: &str, f: impl FnOnce(&mut KeyState, u64) -> T) -> Option<T> {
        let now = self.clock.now_millis();
        self.states
            .get_mut(identifier)
            .map(|mut entry| f(entry.value_mut(), now))
    }

    /// Aggregate counts across all keys.
    pub fn stats(&self) -> LimiterStats {
        let now = self.clock.now_millis();
        let mut stats = LimiterStats::default();
        for entry in self.states.iter() {
            stats.active_identifiers += 1;
            match entry.blocked_until() {
                // An expired block has already ended its streak.
                Some(until) if until <= now => continue,
                Some(_) => stats.blocked_identifiers += 1,
                None => {}
            }
            stats.total_violations += entry.violation_count() as u64;
        }
        stats
    }

    /// Number of keys currently tracked.
    pub fn key_count(&self) -> usize {
        self.states.len()
    }

    /// Prune windows, lift expired blocks, reset stale violation streaks and
    /// evict keys that are empty, unblocked and idle beyond their window.
    ///
    /// Works on a snapshot of the keys and handles each under its own shard
    /// lock, so concurrent checks on other keys are never paused for the
    /// whole pass and an admission racing with eviction is never lost.
    pub fn cleanup(&self) -> SweepReport {
        let now = self.clock.now_millis();
        let horizon_ms = self.staleness_horizon.as_millis() as u64;
        let keys: Vec<String> = self.states.iter().map(|entry| entry.key().clone()).collect();

        let mut report = SweepReport {
            scanned: keys.len(),
            ..Default::default()
        };

        for key in keys {
            let evicted = self.states.remove_if_mut(&key, |_, state| {
                let outcome = state.sweep(now, horizon_ms);
                report.blocks_expired += outcome.block_expired as usize;
                report.violations_reset += outcome.violations_reset as usize;
                outcome.evictable
            });
            if evicted.is_some() {
                report.evicted += 1;
            }
        }

        debug!(
            scanned = report.scanned,
            evicted = report.evicted,
            blocks_expired = report.blocks_expired,
            violations_reset = report.violations_reset,
            "Rate limit sweep finished"
        );
        report
    }

    /// Snapshot of the active policy table.
    pub fn policies(&self) -> Arc<PolicyTable> {
        self.policies.read().clone()
    }

    /// Swap in a new policy table. Existing key state is kept.
    pub fn set_policies(&self, policies: PolicyTable) {
        *self.policies.write() = Arc::new(policies);
        info!("Rate limit policies replaced");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(PolicyTable::builtin())
    }
}

/// Composite key for per-endpoint quotas.
pub fn endpoint_key(identifier: &str, endpoint: &str) -> String {
    format!("{}:{}", identifier, endpoint)
}

/// Reject identifiers the limiter must never see.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        return Err(GatekeeperError::InvalidIdentifier(
            "identifier must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ManualClock, MAX_DURATION};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scenario_policy() -> Policy {
        Policy::new(
            Duration::from_millis(1000),
            3,
            Duration::from_millis(2000),
        )
        .unwrap()
    }

    fn create_test_limiter(default: Policy) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::new(PolicyTable::new(default)).with_clock(clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.key_count(), 0);
        assert_eq!(limiter.stats(), LimiterStats::default());
    }

    #[test]
    fn test_concrete_scenario() {
        let (limiter, clock) = create_test_limiter(scenario_policy());

        for (t, remaining) in [(0, 2), (100, 1), (200, 0)] {
            clock.set(t);
            let result = limiter.check_limit("k", None);
            assert!(result.allowed, "t={} should be admitted", t);
            assert_eq!(result.remaining, remaining);
            assert_eq!(result.reset_time, 1000);
            assert_eq!(result.retry_after, None);
        }

        clock.set(300);
        let result = limiter.check_limit("k", None);
        assert!(!result.allowed);
        assert_eq!(result.retry_after, None);
        assert_eq!(result.reset_time, 1000);
        assert_eq!(limiter.violation_count("k"), 1);

        clock.set(400);
        assert!(!limiter.check_limit("k", None).allowed);
        assert_eq!(limiter.violation_count("k"), 2);

        clock.set(500);
        let result = limiter.check_limit("k", None);
        assert!(!result.allowed);
        assert_eq!(limiter.violation_count("k"), 3);
        assert_eq!(result.reset_time, 2500);
        assert_eq!(result.retry_after, Some(Duration::from_millis(2000)));

        clock.set(600);
        let result = limiter.check_limit("k", None);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.reset_time, 2500);
        assert_eq!(result.retry_after, Some(Duration::from_millis(1900)));
        // Retrying while blocked does not extend the streak.
        assert_eq!(limiter.violation_count("k"), 3);

        clock.set(2600);
        let result = limiter.check_limit("k", None);
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
        assert_eq!(limiter.violation_count("k"), 0);
    }

    #[test]
    fn test_window_correctness() {
        let policy = Policy::new(Duration::from_secs(60), 5, Duration::from_secs(1)).unwrap();
        let (limiter, clock) = create_test_limiter(policy);

        for i in 0..5 {
            clock.set(i * 10);
            assert!(limiter.check_limit("user", None).allowed);
        }
        clock.set(59_999);
        assert!(!limiter.check_limit("user", None).allowed);
    }

    #[test]
    fn test_window_slides_continuously() {
        let (limiter, clock) = create_test_limiter(scenario_policy());

        for t in [0, 400, 800] {
            clock.set(t);
            assert!(limiter.check_limit("k", None).allowed);
        }

        clock.set(999);
        assert!(!limiter.check_limit("k", None).allowed);

        // Only the t=0 slot has been reclaimed.
        clock.set(1000);
        let result = limiter.check_limit("k", None);
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.reset_time, 1400);

        clock.set(1001);
        assert!(!limiter.check_limit("k", None).allowed);
    }

    #[test]
    fn test_block_ignores_free_window_capacity() {
        let policy = Policy::new(Duration::from_millis(100), 1, Duration::from_millis(5000)).unwrap();
        let (limiter, clock) = create_test_limiter(policy);

        limiter.check_limit("k", None);
        for t in [10, 20, 30] {
            clock.set(t);
            assert!(!limiter.check_limit("k", None).allowed);
        }

        // The window is empty again but the block holds.
        clock.set(1000);
        let result = limiter.check_limit("k", None);
        assert!(!result.allowed);
        assert_eq!(result.retry_after, Some(Duration::from_millis(4030)));
        assert_eq!(limiter.request_count("k"), 0);
    }

    #[test]
    fn test_admission_resets_violations() {
        let (limiter, clock) = create_test_limiter(scenario_policy());

        for t in [0, 1, 2] {
            clock.set(t);
            limiter.check_limit("k", None);
        }
        clock.set(10);
        limiter.check_limit("k", None);
        clock.set(20);
        limiter.check_limit("k", None);
        assert_eq!(limiter.violation_count("k"), 2);

        // t=0 ages out and the next request is admitted.
        clock.set(1000);
        assert!(limiter.check_limit("k", None).allowed);
        assert_eq!(limiter.violation_count("k"), 0);

        // A fresh streak of three is needed to block again.
        for expected in 1..=2 {
            assert!(!limiter.check_limit("k", None).allowed);
            assert_eq!(limiter.violation_count("k"), expected);
            assert!(!limiter.is_blocked("k"));
        }
        limiter.check_limit("k", None);
        assert!(limiter.is_blocked("k"));
    }

    #[test]
    fn test_key_isolation() {
        let (limiter, _clock) = create_test_limiter(scenario_policy());

        for _ in 0..6 {
            limiter.check_limit("a", None);
        }
        assert!(limiter.is_blocked("a"));

        let result = limiter.check_limit("b", None);
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
        assert!(!limiter.is_blocked("b"));
        assert_eq!(limiter.violation_count("b"), 0);
    }

    #[test]
    fn test_endpoints_tracked_independently() {
        let limiter = RateLimiter::default();

        for _ in 0..5 {
            assert!(limiter.check_endpoint("10.0.0.1", "login").allowed);
        }
        assert!(!limiter.check_endpoint("10.0.0.1", "login").allowed);

        // Same caller, different endpoint: untouched quota.
        let result = limiter.check_endpoint("10.0.0.1", "list");
        assert!(result.allowed);
        assert_eq!(result.remaining, 299);

        assert_eq!(limiter.request_count("10.0.0.1:login"), 5);
        assert_eq!(limiter.request_count("10.0.0.1:list"), 1);
        assert_eq!(limiter.request_count("10.0.0.1"), 0);
    }

    #[test]
    fn test_unknown_endpoint_uses_default_policy() {
        let (limiter, _clock) = create_test_limiter(scenario_policy());
        let result = limiter.check_endpoint("user", "profile");
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
        assert_eq!(limiter.request_count("user:profile"), 1);
    }

    #[test]
    fn test_check_with_override() {
        let (limiter, _clock) = create_test_limiter(Policy::default());
        let overrides = PolicyOverride::new().with_max_requests(1).unwrap();

        assert!(limiter.check_limit("k", Some(&overrides)).allowed);
        let result = limiter.check_limit("k", Some(&overrides));
        assert!(!result.allowed);
        // Default window still applies.
        assert_eq!(result.reset_time, 15 * 60 * 1000);
    }

    #[test]
    fn test_is_blocked_expires_without_check() {
        let (limiter, clock) = create_test_limiter(scenario_policy());
        for t in 0..6 {
            clock.set(t);
            limiter.check_limit("k", None);
        }

        for t in [100, 1000, 2004] {
            clock.set(t);
            assert!(limiter.is_blocked("k"));
        }
        let status = limiter.status("k").unwrap();
        assert_eq!(status.blocked_until, Some(2005));

        clock.set(2005);
        assert!(!limiter.is_blocked("k"));
        assert!(!limiter.is_blocked("k"));
        assert_eq!(limiter.violation_count("k"), 0);
    }

    #[test]
    fn test_accessors_on_unknown_key() {
        let limiter = RateLimiter::default();
        assert!(!limiter.is_blocked("nobody"));
        assert_eq!(limiter.violation_count("nobody"), 0);
        assert_eq!(limiter.request_count("nobody"), 0);
        assert!(limiter.status("nobody").is_none());
        assert_eq!(limiter.key_count(), 0);
    }

    #[test]
    fn test_clear_single_and_all() {
        let (limiter, _clock) = create_test_limiter(scenario_policy());
        for _ in 0..6 {
            limiter.check_limit("a", None);
        }
        limiter.check_limit("b", None);
        assert!(limiter.is_blocked("a"));

        limiter.clear(Some("a"));
        assert!(!limiter.is_blocked("a"));
        assert!(limiter.check_limit("a", None).allowed);
        assert_eq!(limiter.request_count("b"), 1);

        limiter.clear(None);
        assert_eq!(limiter.key_count(), 0);
    }

    #[test]
    fn test_stats() {
        let (limiter, _clock) = create_test_limiter(scenario_policy());
        for _ in 0..6 {
            limiter.check_limit("blocked", None);
        }
        for _ in 0..4 {
            limiter.check_limit("noisy", None);
        }
        limiter.check_limit("quiet", None);

        let stats = limiter.stats();
        assert_eq!(stats.active_identifiers, 3);
        assert_eq!(stats.blocked_identifiers, 1);
        assert_eq!(stats.total_violations, 4);
    }

    #[test]
    fn test_stats_skip_expired_blocks() {
        let (limiter, clock) = create_test_limiter(scenario_policy());
        for _ in 0..6 {
            limiter.check_limit("expired", None);
        }
        clock.set(2500);
        limiter.check_limit("noisy", None);
        for _ in 0..4 {
            limiter.check_limit("noisy", None);
        }

        let stats = limiter.stats();
        assert_eq!(stats.active_identifiers, 2);
        assert_eq!(stats.blocked_identifiers, 0);
        assert_eq!(stats.total_violations, 2);
        assert_eq!(
            stats.total_violations,
            (limiter.violation_count("expired") + limiter.violation_count("noisy")) as u64
        );
    }

    #[test]
    fn test_longest_override_still_enforced() {
        let (limiter, clock) = create_test_limiter(Policy::default());
        let start = 1_700_000_000_000;
        clock.set(start);
        let max_ms = MAX_DURATION.as_millis() as u64;
        let overrides = PolicyOverride::new()
            .with_window(MAX_DURATION)
            .unwrap()
            .with_block_duration(MAX_DURATION)
            .unwrap()
            .with_max_requests(1)
            .unwrap();

        assert!(limiter.check_limit("k", Some(&overrides)).allowed);
        let denied = limiter.check_limit("k", Some(&overrides));
        assert!(!denied.allowed);
        assert_eq!(denied.reset_time, start + max_ms);

        limiter.check_limit("k", Some(&overrides));
        let blocked = limiter.check_limit("k", Some(&overrides));
        assert!(!blocked.allowed);
        assert_eq!(blocked.reset_time, start + max_ms);
        assert!(limiter.is_blocked("k"));
    }

    #[test]
    fn test_cleanup_evicts_idle_keys() {
        let (limiter, clock) = create_test_limiter(scenario_policy());
        limiter.check_limit("idle", None);
        clock.set(500);
        limiter.check_limit("recent", None);

        clock.set(1200);
        let report = limiter.cleanup();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.evicted, 1);
        assert_eq!(limiter.key_count(), 1);
        assert_eq!(limiter.request_count("recent"), 1);

        clock.set(5000);
        limiter.cleanup();
        assert_eq!(limiter.key_count(), 0);
    }

    #[test]
    fn test_cleanup_keeps_blocked_keys() {
        let (limiter, clock) = create_test_limiter(scenario_policy());
        for _ in 0..6 {
            limiter.check_limit("k", None);
        }

        clock.set(1500);
        let report = limiter.cleanup();
        assert_eq!(report.evicted, 0);
        assert!(limiter.is_blocked("k"));

        clock.set(3000);
        let report = limiter.cleanup();
        assert_eq!(report.blocks_expired, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(limiter.key_count(), 0);
    }

    #[test]
    fn test_concurrent_checks_respect_limit() {
        let policy = Policy::new(Duration::from_secs(60), 50, Duration::from_secs(60)).unwrap();
        let (limiter, _clock) = create_test_limiter(policy);
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        if limiter.check_limit("shared", None).allowed {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 50);
        assert_eq!(limiter.request_count("shared"), 50);
        assert!(limiter.is_blocked("shared"));
    }

    #[test]
    fn test_cleanup_concurrent_with_checks_loses_nothing() {
        let policy = Policy::new(Duration::from_secs(60), 10_000, Duration::from_secs(1)).unwrap();
        let (limiter, _clock) = create_test_limiter(policy);

        std::thread::scope(|s| {
            for worker in 0..4 {
                let limiter = &limiter;
                s.spawn(move || {
                    for i in 0..500 {
                        let key = format!("key-{}", (worker * 500 + i) % 64);
                        assert!(limiter.check_limit(&key, None).allowed);
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..50 {
                    limiter.cleanup();
                }
            });
        });

        let total: usize = (0..64)
            .map(|i| limiter.request_count(&format!("key-{}", i)))
            .sum();
        assert_eq!(total, 2000);
    }

    #[test]
    fn test_set_policies_applies_to_next_check() {
        let (limiter, _clock) = create_test_limiter(Policy::default());
        assert_eq!(limiter.check_limit("k", None).remaining, 99);

        limiter.set_policies(PolicyTable::new(scenario_policy()));
        assert_eq!(limiter.policies().default_policy(), scenario_policy());
        assert_eq!(limiter.check_limit("j", None).remaining, 2);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("user-1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("   ").is_err());
    }
}
