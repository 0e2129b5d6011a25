//! Run orchestration.
//!
//! Drives one sync run: discover subscriptions, upsert them, then for each
//! subscription batch walk the container and resource query sequences,
//! reconcile every page, and hand the classified tasks to the dispatcher.
//! The run is idle before `run` and idle again after the last batch's last
//! page is drained; a fatal discovery or pagination error aborts the whole
//! run and surfaces to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use atlas_common::resilience::TokenBucket;
use atlas_common::utils::chunked;
use atlas_domain::{
    AtlasError, DeliveryOperation, DeliveryTask, EntityKind, Subscription, SyncMode, SyncSettings,
};
use tracing::{info, instrument, warn};

use crate::dispatch::{BoundedDispatcher, DispatcherConfig};
use crate::kql;
use crate::pagination::PagedQueryRunner;
use crate::ports::{CatalogDelivery, GraphQueryExecutor, InventoryDiscovery};
use crate::reconcile::{ChangeReconciler, ContainerKey};

/// Burst allowance for the query backend.
const QUERY_BURST_CAPACITY: u32 = 15;
/// Sustained query rate (tokens per second).
const QUERY_REFILL_PER_SECOND: f64 = 3.0;

/// Drives one synchronization run end to end.
pub struct SyncOrchestrator {
    discovery: Arc<dyn InventoryDiscovery>,
    executor: Arc<dyn GraphQueryExecutor>,
    dispatcher: BoundedDispatcher,
    limiter: TokenBucket,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default dispatcher tuning (the
    /// configured concurrency limit, batches of 100, two retries).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the query limiter cannot be built.
    pub fn new(
        discovery: Arc<dyn InventoryDiscovery>,
        executor: Arc<dyn GraphQueryExecutor>,
        delivery: Arc<dyn CatalogDelivery>,
        settings: SyncSettings,
    ) -> Result<Self, AtlasError> {
        let dispatcher_config = DispatcherConfig {
            concurrency: settings.delivery_concurrency,
            ..DispatcherConfig::default()
        };
        Self::with_dispatcher_config(discovery, executor, delivery, settings, dispatcher_config)
    }

    /// Create an orchestrator with explicit dispatcher tuning.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the query limiter cannot be built.
    pub fn with_dispatcher_config(
        discovery: Arc<dyn InventoryDiscovery>,
        executor: Arc<dyn GraphQueryExecutor>,
        delivery: Arc<dyn CatalogDelivery>,
        settings: SyncSettings,
        dispatcher_config: DispatcherConfig,
    ) -> Result<Self, AtlasError> {
        // One limiter paces every query this run issues, across batches.
        let limiter = TokenBucket::new(QUERY_BURST_CAPACITY, QUERY_REFILL_PER_SECOND)
            .map_err(AtlasError::Config)?;

        Ok(Self {
            discovery,
            executor,
            dispatcher: BoundedDispatcher::new(delivery, dispatcher_config),
            limiter,
            settings,
        })
    }

    /// Execute one full run.
    ///
    /// # Errors
    ///
    /// Fails on discovery errors and on fatal query errors (configuration
    /// problems or non-retryable backend statuses). Individual delivery
    /// failures are retried and, if still failing, dropped with a warning —
    /// they never fail the run.
    #[instrument(skip(self), fields(mode = ?self.settings.sync_mode))]
    pub async fn run(&self) -> Result<(), AtlasError> {
        info!("Starting inventory sync");

        let filters = &self.settings.container_tag_filters;
        if filters.has_filters() {
            info!(
                include = ?filters.include,
                exclude = ?filters.exclude,
                "Container tag filtering enabled"
            );
        }

        let subscriptions = self.discovery.list_subscriptions().await.map_err(AtlasError::from)?;
        info!(count = subscriptions.len(), "Discovered subscriptions");

        if subscriptions.is_empty() {
            warn!("No subscriptions found, nothing to sync");
            return Ok(());
        }

        self.upsert_subscriptions(&subscriptions).await;

        let ids: Vec<String> =
            subscriptions.iter().map(|s| s.subscription_id.clone()).collect();
        let batch_size = self.settings.subscription_batch_size.max(1);
        let mut seen_containers: HashSet<ContainerKey> = HashSet::new();

        for batch in chunked(&ids, batch_size) {
            info!(subscriptions = batch.len(), "Running queries for subscription batch");
            self.sync_containers(&batch).await?;
            self.sync_resources(&batch, &mut seen_containers).await?;
        }

        info!("Inventory sync completed");
        Ok(())
    }

    /// Upsert every discovered subscription as a catalog entity.
    async fn upsert_subscriptions(&self, subscriptions: &[Subscription]) {
        info!(count = subscriptions.len(), "Upserting subscriptions");

        let tasks: Vec<DeliveryTask> = subscriptions
            .iter()
            .map(|sub| DeliveryTask {
                payload: sub.to_payload(),
                id: sub.subscription_id.clone(),
                operation: DeliveryOperation::Upsert,
                entity: EntityKind::Subscription,
            })
            .collect();

        let stats = self.dispatcher.dispatch(tasks).await;
        info!(delivered = stats.delivered, dropped = stats.dropped, "Subscription upserts done");
    }

    /// Walk the container query for one batch and deliver its pages.
    async fn sync_containers(&self, batch: &[String]) -> Result<(), AtlasError> {
        let query = match self.settings.sync_mode {
            SyncMode::Incremental => kql::incremental_containers_query(
                self.settings.change_window_minutes,
                &self.settings.container_tag_filters,
            ),
            SyncMode::Full => kql::full_containers_query(&self.settings.container_tag_filters),
        };

        let reconciler = ChangeReconciler::containers();
        let mut runner = PagedQueryRunner::new(
            Arc::clone(&self.executor),
            self.limiter.clone(),
            query,
            batch.to_vec(),
        );

        while let Some(records) = runner.next_page().await.map_err(AtlasError::from)? {
            info!(count = records.len(), "Received resource container page");
            if records.is_empty() {
                info!("No container changes in this page");
                continue;
            }

            let outcome = reconciler.reconcile(records);
            self.dispatch_waves(outcome.upserts, outcome.deletes).await;
        }

        Ok(())
    }

    /// Walk the resource query for one batch and deliver its pages,
    /// upserting each derived parent container the first time it is seen
    /// this run.
    async fn sync_resources(
        &self,
        batch: &[String],
        seen_containers: &mut HashSet<ContainerKey>,
    ) -> Result<(), AtlasError> {
        let query = match self.settings.sync_mode {
            SyncMode::Incremental => {
                kql::incremental_resources_query(self.settings.change_window_minutes)
            }
            SyncMode::Full => kql::full_resources_query(),
        };

        let reconciler = ChangeReconciler::resources();
        let mut runner = PagedQueryRunner::new(
            Arc::clone(&self.executor),
            self.limiter.clone(),
            query,
            batch.to_vec(),
        );

        while let Some(records) = runner.next_page().await.map_err(AtlasError::from)? {
            info!(count = records.len(), "Received resource page");
            if records.is_empty() {
                info!("No resource changes in this page");
                continue;
            }

            let outcome = reconciler.reconcile(records);

            let derived: Vec<DeliveryTask> = outcome
                .containers
                .iter()
                .filter(|key| seen_containers.insert((*key).clone()))
                .map(ContainerKey::to_task)
                .collect();
            if !derived.is_empty() {
                let stats = self.dispatcher.dispatch(derived).await;
                info!(
                    delivered = stats.delivered,
                    dropped = stats.dropped,
                    "Derived container upserts done"
                );
            }

            self.dispatch_waves(outcome.upserts, outcome.deletes).await;
        }

        Ok(())
    }

    /// Dispatch one page's upserts and deletes as separate waves so a
    /// record's upsert never races its own deletion.
    async fn dispatch_waves(&self, upserts: Vec<DeliveryTask>, deletes: Vec<DeliveryTask>) {
        info!(upserts = upserts.len(), deletes = deletes.len(), "Dispatching page");

        let upsert_stats = self.dispatcher.dispatch(upserts).await;
        let delete_stats = self.dispatcher.dispatch(deletes).await;

        info!(
            delivered = upsert_stats.delivered + delete_stats.delivered,
            dropped = upsert_stats.dropped + delete_stats.dropped,
            "Page dispatched"
        );
    }
}
