//! Graph-query backend client.

mod client;

pub use client::ResourceGraphClient;
