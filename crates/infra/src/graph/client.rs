//! HTTP client for the provider's management and graph-query APIs.
//!
//! Implements both core ports the engine needs from the provider side:
//! subscription discovery (paged via `nextLink`) and graph-query execution
//! (paged via `$skipToken`). Credential acquisition happens outside the
//! engine; this client takes a pre-acquired bearer token and treats a
//! missing or unusable one as a configuration error at construction time.

use std::time::Duration;

use async_trait::async_trait;
use atlas_core::ports::{GraphQueryExecutor, InventoryDiscovery, QueryError};
use atlas_domain::{ChangeRecord, GraphSettings, QueryPage, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

/// API version for the graph-query endpoint.
const QUERY_API_VERSION: &str = "2021-03-01";
/// API version for the subscription listing endpoint.
const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";
/// Request timeout for both endpoints.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the provider management API.
#[derive(Debug)]
pub struct ResourceGraphClient {
    http: reqwest::Client,
    management_url: Url,
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    subscriptions: &'a [String],
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<QueryOptions<'a>>,
}

#[derive(Debug, Serialize)]
struct QueryOptions<'a> {
    #[serde(rename = "$skipToken")]
    skip_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(rename = "$skipToken", default)]
    skip_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionsResponse {
    #[serde(default)]
    value: Vec<Subscription>,
    #[serde(default)]
    next_link: Option<String>,
}

impl ResourceGraphClient {
    /// Build a client from graph settings.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotConfigured`] when the token is empty, the
    /// management URL does not parse, or the HTTP client cannot be built —
    /// all fatal before the first request.
    pub fn new(settings: &GraphSettings) -> Result<Self, QueryError> {
        if settings.access_token.trim().is_empty() {
            return Err(QueryError::NotConfigured("access token is empty".to_string()));
        }

        let management_url = Url::parse(&settings.management_url)
            .map_err(|e| QueryError::NotConfigured(format!("invalid management URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| QueryError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, management_url, access_token: settings.access_token.clone() })
    }

    fn endpoint(&self, path: &str, api_version: &str) -> Result<Url, QueryError> {
        let mut url = self
            .management_url
            .join(path)
            .map_err(|e| QueryError::NotConfigured(format!("invalid endpoint path: {e}")))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, QueryError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        Self::parse_response(response).await
    }

    async fn parse_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, QueryError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QueryError::Backend { status: status.as_u16(), message });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| QueryError::Transport(format!("failed to decode response: {e}")))
    }
}

#[async_trait]
impl InventoryDiscovery for ResourceGraphClient {
    #[instrument(skip(self))]
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, QueryError> {
        debug!("listing subscriptions");

        let mut subscriptions = Vec::new();
        let mut next: Option<Url> = Some(self.endpoint("/subscriptions", SUBSCRIPTIONS_API_VERSION)?);

        while let Some(url) = next.take() {
            let page: SubscriptionsResponse = self.get_json(url).await?;
            subscriptions.extend(page.value);

            if let Some(link) = page.next_link {
                next = Some(
                    Url::parse(&link)
                        .map_err(|e| QueryError::Transport(format!("bad nextLink: {e}")))?,
                );
            }
        }

        debug!(count = subscriptions.len(), "subscription listing complete");
        Ok(subscriptions)
    }
}

#[async_trait]
impl GraphQueryExecutor for ResourceGraphClient {
    #[instrument(skip(self, query), fields(subscriptions = subscriptions.len()))]
    async fn execute(
        &self,
        query: &str,
        subscriptions: &[String],
        cursor: Option<&str>,
    ) -> Result<QueryPage, QueryError> {
        let url = self.endpoint("/providers/Microsoft.ResourceGraph/resources", QUERY_API_VERSION)?;

        let body = QueryRequest {
            subscriptions,
            query,
            options: cursor.map(|token| QueryOptions { skip_token: token }),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let parsed: QueryResponse = Self::parse_response(response).await?;

        let mut records = Vec::with_capacity(parsed.data.len());
        for row in parsed.data {
            match serde_json::from_value::<ChangeRecord>(row) {
                Ok(record) => records.push(record),
                // A malformed row is the backend's problem, not a reason to
                // abort the page.
                Err(e) => warn!(error = %e, "skipping malformed record"),
            }
        }

        debug!(records = records.len(), has_cursor = parsed.skip_token.is_some(), "page fetched");
        Ok(QueryPage { records, next_cursor: parsed.skip_token })
    }
}
