//! Ratekeeper - Multi-Rule Sliding-Window Rate Limiter
//!
//! This crate tracks a shared timeline of admitted events against any number
//! of independent "at most N events per T seconds" rules, answers whether an
//! event may happen now, and reports the exact wait when it may not. State is
//! kept in a JSON log so that limits hold across process restarts.

pub mod config;
pub mod error;
pub mod ratelimit;
