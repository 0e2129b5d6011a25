//! Settings loader
//!
//! Loads run settings from environment variables.
//!
//! ## Environment Variables
//! - `ATLAS_ACCESS_TOKEN`: bearer token for the management API (required)
//! - `ATLAS_CATALOG_INGEST_URL`: catalog webhook URL (required)
//! - `ATLAS_MANAGEMENT_URL`: management API base URL
//!   (default `https://management.azure.com`)
//! - `ATLAS_SYNC_MODE`: `incremental` or `full` (default `incremental`)
//! - `ATLAS_CHANGE_WINDOW_MINUTES`: incremental look-back window (default 15)
//! - `ATLAS_SUBSCRIPTION_BATCH_SIZE`: subscriptions per query batch
//!   (default 1000; zero falls back to the default)
//! - `ATLAS_DELIVERY_CONCURRENCY`: max in-flight delivery calls (default 25)
//! - `ATLAS_RG_TAG_FILTERS`: container tag filters as JSON, e.g.
//!   `{"include": {"Env": "prod"}, "exclude": {"Temporary": "true"}}`.
//!   Malformed values degrade to "no filters" with a warning instead of
//!   failing the run.

use atlas_domain::{
    AtlasError, CatalogSettings, GraphSettings, Result, SyncMode, SyncSettings, TagFilterSet,
};
use tracing::warn;

/// Default management API base URL.
const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";

/// Load settings from environment variables.
///
/// # Errors
/// Returns `AtlasError::Config` if a required variable is missing or a
/// numeric/mode value does not parse. The tag-filter variable never fails
/// the load; see the module documentation.
pub fn load_from_env() -> Result<SyncSettings> {
    load(&|name| std::env::var(name).ok())
}

/// Load settings through an arbitrary variable lookup (tests inject maps).
fn load(lookup: &dyn Fn(&str) -> Option<String>) -> Result<SyncSettings> {
    let access_token = require(lookup, "ATLAS_ACCESS_TOKEN")?;
    let ingest_url = require(lookup, "ATLAS_CATALOG_INGEST_URL")?;

    let management_url =
        lookup("ATLAS_MANAGEMENT_URL").unwrap_or_else(|| DEFAULT_MANAGEMENT_URL.to_string());

    let sync_mode = match lookup("ATLAS_SYNC_MODE") {
        Some(raw) => raw.parse::<SyncMode>()?,
        None => SyncMode::default(),
    };

    let change_window_minutes = parse_or_default(
        lookup,
        "ATLAS_CHANGE_WINDOW_MINUTES",
        SyncSettings::DEFAULT_CHANGE_WINDOW_MINUTES,
    )?;

    let mut subscription_batch_size = parse_or_default(
        lookup,
        "ATLAS_SUBSCRIPTION_BATCH_SIZE",
        SyncSettings::DEFAULT_SUBSCRIPTION_BATCH_SIZE,
    )?;
    if subscription_batch_size == 0 {
        warn!(
            default = SyncSettings::DEFAULT_SUBSCRIPTION_BATCH_SIZE,
            "subscription batch size of zero is unusable, falling back to default"
        );
        subscription_batch_size = SyncSettings::DEFAULT_SUBSCRIPTION_BATCH_SIZE;
    }

    let delivery_concurrency = parse_or_default(
        lookup,
        "ATLAS_DELIVERY_CONCURRENCY",
        SyncSettings::DEFAULT_DELIVERY_CONCURRENCY,
    )?;

    let container_tag_filters = match lookup("ATLAS_RG_TAG_FILTERS") {
        None => TagFilterSet::default(),
        Some(raw) => TagFilterSet::from_json(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "malformed tag filter configuration, proceeding unfiltered");
            TagFilterSet::default()
        }),
    };

    Ok(SyncSettings {
        graph: GraphSettings { management_url, access_token },
        catalog: CatalogSettings { ingest_url },
        sync_mode,
        change_window_minutes,
        subscription_batch_size,
        delivery_concurrency,
        container_tag_filters,
    })
}

fn require(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AtlasError::Config(format!("Missing environment variable: {name}")))
}

fn parse_or_default<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AtlasError::Config(format!("Invalid value for {name}: {e}"))),
    }
}
