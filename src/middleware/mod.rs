//! Middleware for the request pipeline.
//!
//! This module provides:
//! - Request logging with request ids and latency tracking
//! - The guard: bearer identity, authorization and rate limiting per route
//! - The sliding-window rate limiter the guard meters with

pub mod guard;
pub mod logging;
pub mod rate_limit;

pub use guard::{guard, Guard, GuardContext, GuardPolicy, Identity};
pub use logging::request_logging;
pub use rate_limit::{RateLimitConfig, RateLimiter};
