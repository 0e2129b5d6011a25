//! # Atlas Infra
//!
//! Concrete collaborators for the sync engine: HTTP clients for the
//! provider's graph-query backend and the catalog ingestion endpoint, plus
//! the environment-based settings loader. Everything here implements the
//! traits defined in `atlas-core::ports`; the engine itself never touches a
//! socket.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod catalog;
pub mod config;
pub mod graph;

pub use catalog::CatalogWebhookClient;
pub use graph::ResourceGraphClient;
