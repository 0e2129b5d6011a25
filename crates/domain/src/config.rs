//! Configuration for one sync run.
//!
//! Settings are loaded once (see `atlas-infra`) and passed explicitly into
//! each component's constructor; nothing reads configuration from process
//! globals.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AtlasError;
use crate::types::TagFilterSet;

/// Which query templates and classification path a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Query only records changed inside the configured window and classify
    /// each by change type.
    #[default]
    Incremental,
    /// Query the entire current inventory and upsert every record.
    Full,
}

impl FromStr for SyncMode {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incremental" => Ok(Self::Incremental),
            "full" => Ok(Self::Full),
            other => Err(AtlasError::Config(format!("Unknown sync mode: {other}"))),
        }
    }
}

/// Connection settings for the graph-query backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Base URL of the provider management API.
    pub management_url: String,
    /// Pre-acquired bearer token; credential acquisition happens outside
    /// the engine.
    #[serde(skip_serializing)]
    pub access_token: String,
}

/// Connection settings for the catalog ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Webhook URL records are delivered to.
    pub ingest_url: String,
}

/// Settings for one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub graph: GraphSettings,
    pub catalog: CatalogSettings,
    /// Incremental or full sync.
    pub sync_mode: SyncMode,
    /// Incremental queries look this many minutes back.
    pub change_window_minutes: u32,
    /// Subscriptions per query batch.
    pub subscription_batch_size: usize,
    /// Maximum concurrent delivery calls.
    pub delivery_concurrency: usize,
    /// Container tag constraints; empty means unfiltered.
    pub container_tag_filters: TagFilterSet,
}

impl SyncSettings {
    /// Default change window in minutes.
    pub const DEFAULT_CHANGE_WINDOW_MINUTES: u32 = 15;
    /// Default subscription batch size.
    pub const DEFAULT_SUBSCRIPTION_BATCH_SIZE: usize = 1000;
    /// Default delivery concurrency limit.
    pub const DEFAULT_DELIVERY_CONCURRENCY: usize = 25;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_parses_case_insensitively() {
        assert_eq!("incremental".parse::<SyncMode>().unwrap(), SyncMode::Incremental);
        assert_eq!(" Full ".parse::<SyncMode>().unwrap(), SyncMode::Full);
        assert!("delta".parse::<SyncMode>().is_err());
    }
}
