//! Gatekeeper - Adaptive Request Rate Limiting
//!
//! This crate implements a per-key sliding-window rate limiter that escalates
//! repeated violations into temporary blocks, with per-endpoint policies.
//! It can be embedded directly or run as an HTTP sidecar.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
