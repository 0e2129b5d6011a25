//! Shared utilities for the Atlas workspace.
//!
//! This crate holds the domain-free building blocks the sync engine relies
//! on: a clock abstraction for testable time-based code, the token-bucket
//! rate limiter that paces outbound query traffic, and small sequence
//! helpers.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;
pub mod utils;
