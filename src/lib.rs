//! Pacer - in-process rate limiting primitives
//!
//! This crate provides two independent limiters for tokio applications:
//! a leaky bucket whose tokens are restored by an owned background task,
//! and a fixed window limiter that makes callers wait out an exhausted
//! window before their operation runs.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{PacerError, Result};
pub use ratelimit::{LeakyBucket, WindowedLimiter};
