//! Collaborator contracts the engine depends on.
//!
//! The engine is a client of two external systems: the provider's
//! graph-query backend (discovery + paged queries) and the catalog's
//! ingestion endpoint (delivery). Both are modeled as traits so the core
//! stays free of transport concerns and tests can substitute fakes.

use async_trait::async_trait;
use atlas_domain::{AtlasError, DeliveryOperation, EntityKind, QueryPage, Subscription};
use serde_json::Value;
use thiserror::Error;

/// Failures surfaced by the graph-query backend.
///
/// Every variant is fatal to the pagination sequence that hit it; the only
/// retry the engine performs at that layer is the local rate-limit backoff,
/// which never reaches this type.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The client was never usable (missing credentials, bad base URL).
    #[error("query backend not configured: {0}")]
    NotConfigured(String),

    /// The backend answered with a non-retryable status.
    #[error("query backend rejected the request (status {status}): {message}")]
    Backend { status: u16, message: String },

    /// The request never produced a usable response.
    #[error("query transport failure: {0}")]
    Transport(String),
}

impl From<QueryError> for AtlasError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotConfigured(msg) => AtlasError::Config(msg),
            other => AtlasError::Network(other.to_string()),
        }
    }
}

/// Failures surfaced by one catalog delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Network failure or server-side (5xx-class) error; worth retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// The catalog rejected the payload (4xx-class); retrying cannot help.
    #[error("catalog rejected the request: {0}")]
    Client(String),
}

impl DeliveryError {
    /// True when the dispatcher may retry the attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Source of the subscription inventory.
#[async_trait]
pub trait InventoryDiscovery: Send + Sync {
    /// List every subscription visible to the engine's identity.
    ///
    /// The result is finite and materialized; the orchestrator chunks it
    /// eagerly.
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, QueryError>;
}

/// Executes one graph query page against the backend.
#[async_trait]
pub trait GraphQueryExecutor: Send + Sync {
    /// Run `query` scoped to `subscriptions`, resuming from `cursor` when
    /// present. Returns the page plus the continuation token for the next
    /// one, if any.
    async fn execute(
        &self,
        query: &str,
        subscriptions: &[String],
        cursor: Option<&str>,
    ) -> Result<QueryPage, QueryError>;
}

/// Delivers one entity operation to the catalog.
#[async_trait]
pub trait CatalogDelivery: Send + Sync {
    /// Send one upsert/delete for the identified entity.
    async fn send(
        &self,
        payload: &Value,
        id: &str,
        operation: DeliveryOperation,
        entity: EntityKind,
    ) -> Result<(), DeliveryError>;
}
