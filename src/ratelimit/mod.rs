//! Rate limiting logic and state management.

mod clock;
mod limiter;
mod policy;
mod rules;
mod state;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{
    endpoint_key, validate_identifier, AdmissionResult, KeyStatus, LimiterStats, RateLimiter,
    SweepReport, DEFAULT_STALENESS_HORIZON,
};
pub use policy::{OverrideRule, Policy, PolicyOverride, PolicyRule, MAX_DURATION};
pub use rules::{EndpointClass, PolicyTable, ResolvedEndpoint, RulesConfig};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
