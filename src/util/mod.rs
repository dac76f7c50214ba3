//! Shared utilities

pub mod rate_limit;
pub mod ticker;
pub mod time;
