//! Catalog ingestion client.

mod client;

pub use client::CatalogWebhookClient;
