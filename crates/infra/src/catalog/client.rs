//! HTTP client for the catalog ingestion endpoint.
//!
//! One delivery is one POST of `{"data": ..., "operation": ..., "type":
//! ...}` to the configured webhook URL. This client only classifies the
//! outcome — 4xx-class answers are client errors the dispatcher must not
//! retry, everything else that fails is transient. Retry policy itself
//! lives in the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use atlas_core::ports::{CatalogDelivery, DeliveryError};
use atlas_domain::{AtlasError, CatalogSettings, DeliveryOperation, EntityKind};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

/// Request timeout for delivery calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the catalog webhook.
pub struct CatalogWebhookClient {
    http: reqwest::Client,
    ingest_url: Url,
}

impl CatalogWebhookClient {
    /// Build a client from catalog settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the ingest URL does not parse or
    /// the HTTP client cannot be built.
    pub fn new(settings: &CatalogSettings) -> Result<Self, AtlasError> {
        let ingest_url = Url::parse(&settings.ingest_url)
            .map_err(|e| AtlasError::Config(format!("invalid ingest URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AtlasError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, ingest_url })
    }
}

#[async_trait]
impl CatalogDelivery for CatalogWebhookClient {
    async fn send(
        &self,
        payload: &Value,
        id: &str,
        operation: DeliveryOperation,
        entity: EntityKind,
    ) -> Result<(), DeliveryError> {
        debug!(id, operation = operation.as_str(), entity = entity.as_str(), "sending to catalog");

        let body = json!({
            "data": payload,
            "operation": operation.as_str(),
            "type": entity.as_str(),
        });

        let response = self
            .http
            .post(self.ingest_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = format!("catalog answered {status} for {id}");
        if status.is_client_error() {
            Err(DeliveryError::Client(message))
        } else {
            Err(DeliveryError::Transient(message))
        }
    }
}
