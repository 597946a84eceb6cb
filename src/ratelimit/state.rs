//! Per-key sliding window state.

use std::collections::VecDeque;

use super::policy::Policy;

/// What a sweep did to one key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepOutcome {
    pub block_expired: bool,
    pub violations_reset: bool,
    pub evictable: bool,
}

/// Admission state for a single identifier.
///
/// Not synchronized on its own; the limiter only touches it while holding
/// the map shard lock for its key.
#[derive(Debug, Clone)]
pub(crate) struct KeyState {
    /// Admitted request times, oldest first
    request_times: VecDeque<u64>,
    /// Consecutive denials since the last admission or cooldown
    violation_count: u32,
    /// Block expiry, if escalated
    blocked_until: Option<u64>,
    /// Window of the policy last applied to this key
    window_ms: u64,
    /// Time of the last check
    last_seen: u64,
}

impl KeyState {
    pub fn new(now: u64, window_ms: u64) -> Self {
        Self {
            request_times: VecDeque::new(),
            violation_count: 0,
            blocked_until: None,
            window_ms,
            last_seen: now,
        }
    }

    /// Record a check against this key under `policy`.
    pub fn touch(&mut self, now: u64, policy: &Policy) {
        self.window_ms = policy.window_ms();
        self.last_seen = self.last_seen.max(now);
    }

    /// Returns the block expiry if a block is in force at `now`.
    ///
    /// An expired block is cleared on the way, which also ends the
    /// violation streak.
    pub fn active_block(&mut self, now: u64) -> Option<u64> {
        match self.blocked_until {
            Some(until) if until > now => Some(until),
            Some(_) => {
                self.blocked_until = None;
                self.violation_count = 0;
                None
            }
            None => None,
        }
    }

    /// Drop timestamps that fell out of the window ending at `now`.
    pub fn prune(&mut self, now: u64) {
        let window = self.window_ms;
        while let Some(&oldest) = self.request_times.front() {
            if oldest.saturating_add(window) > now {
                break;
            }
            self.request_times.pop_front();
        }
    }

    /// Admitted requests currently inside the window.
    pub fn in_window(&self) -> usize {
        self.request_times.len()
    }

    /// When the oldest retained request leaves the window.
    pub fn window_reset(&self, now: u64) -> u64 {
        self.request_times
            .front()
            .copied()
            .unwrap_or(now)
            .saturating_add(self.window_ms)
    }

    /// Record an admitted request.
    pub fn admit(&mut self, now: u64) {
        // Keep the sequence non-decreasing even if the wall clock steps back.
        let at = self.request_times.back().map_or(now, |&last| last.max(now));
        self.request_times.push_back(at);
        self.violation_count = 0;
    }

    /// Record a denial; returns the block expiry if this denial escalated.
    pub fn deny(&mut self, now: u64, policy: &Policy) -> Option<u64> {
        self.violation_count = self.violation_count.saturating_add(1);
        if self.violation_count >= Policy::ESCALATION_THRESHOLD {
            let until = now.saturating_add(policy.block_ms());
            self.blocked_until = Some(until);
            Some(until)
        } else {
            None
        }
    }

    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    pub fn blocked_until(&self) -> Option<u64> {
        self.blocked_until
    }

    /// Periodic maintenance; see [`crate::ratelimit::RateLimiter::cleanup`].
    pub fn sweep(&mut self, now: u64, staleness_horizon_ms: u64) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        self.prune(now);
        let had_block = self.blocked_until.is_some();
        let blocked = self.active_block(now).is_some();
        outcome.block_expired = had_block && !blocked;

        let idle = now.saturating_sub(self.last_seen);
        if !blocked
            && self.violation_count > 0
            && idle >= self.window_ms.min(staleness_horizon_ms)
        {
            self.violation_count = 0;
            outcome.violations_reset = true;
        }

        outcome.evictable = !blocked && self.request_times.is_empty() && idle >= self.window_ms;
        outcome
    }
}
