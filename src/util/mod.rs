//! Shared utilities

pub mod rate_limit;
pub mod throttle;
pub mod time;
