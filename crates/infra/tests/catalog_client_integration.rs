//! Integration tests for catalog delivery against a mock webhook.
//!
//! Coverage:
//! - Wire payload shape (`data` / `operation` / `type`)
//! - Status classification: 2xx success, 4xx client error, 5xx transient
//! - Dispatcher + client together: transient failures retried to success,
//!   persistent failures dropped without failing the run

use std::sync::Arc;
use std::time::Duration;

use atlas_core::dispatch::{BoundedDispatcher, DispatcherConfig};
use atlas_core::ports::{CatalogDelivery, DeliveryError};
use atlas_domain::{CatalogSettings, DeliveryOperation, DeliveryTask, EntityKind};
use atlas_infra::CatalogWebhookClient;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> CatalogWebhookClient {
    CatalogWebhookClient::new(&CatalogSettings {
        ingest_url: format!("{}/ingest", server.uri()),
    })
    .unwrap()
}

fn task(id: &str) -> DeliveryTask {
    DeliveryTask {
        payload: json!({ "resourceId": id }),
        id: id.to_string(),
        operation: DeliveryOperation::Upsert,
        entity: EntityKind::Resource,
    }
}

#[tokio::test]
async fn delivery_posts_the_expected_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(body_json(json!({
            "data": { "resourceId": "/r/a", "name": "vm-a" },
            "operation": "upsert",
            "type": "resource",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .send(
            &json!({ "resourceId": "/r/a", "name": "vm-a" }),
            "/r/a",
            DeliveryOperation::Upsert,
            EntityKind::Resource,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_operations_carry_the_delete_verb() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(body_json(json!({
            "data": { "resourceId": "/r/gone" },
            "operation": "delete",
            "type": "resourceContainer",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .send(
            &json!({ "resourceId": "/r/gone" }),
            "/r/gone",
            DeliveryOperation::Delete,
            EntityKind::ResourceContainer,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn client_errors_are_not_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send(&json!({}), "/r/a", DeliveryOperation::Upsert, EntityKind::Resource)
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Client(_)));
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send(&json!({}), "/r/a", DeliveryOperation::Upsert, EntityKind::Resource)
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Transient(_)));
}

fn fast_dispatcher(delivery: Arc<dyn CatalogDelivery>) -> BoundedDispatcher {
    BoundedDispatcher::new(
        delivery,
        DispatcherConfig { retry_delay: Duration::from_millis(5), ..DispatcherConfig::default() },
    )
}

#[tokio::test]
async fn dispatcher_retries_transient_failures_to_success() {
    let server = MockServer::start().await;

    // Two 500s, then the endpoint recovers.
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = fast_dispatcher(Arc::new(client_for(&server)));
    let stats = dispatcher.dispatch(vec![task("/r/a")]).await;

    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn dispatcher_drops_after_exhausting_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3) // initial attempt + two retries
        .mount(&server)
        .await;

    let dispatcher = fast_dispatcher(Arc::new(client_for(&server)));
    let stats = dispatcher.dispatch(vec![task("/r/a")]).await;

    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.dropped, 1);
}

#[tokio::test]
async fn dispatcher_does_not_retry_rejected_payloads() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = fast_dispatcher(Arc::new(client_for(&server)));
    let stats = dispatcher.dispatch(vec![task("/r/a")]).await;

    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.dropped, 1);
}
