//! Bounded-concurrency delivery with per-task retry.
//!
//! Tasks are submitted in fixed-size waves; within a wave every task runs
//! concurrently, each holding one permit of a semaphore shared across the
//! whole engine run. The dispatcher waits for a full wave before taking the
//! next one, which is what couples producer pace to delivery capacity.
//! Individual task failures never fail the run: transient errors are
//! retried a fixed number of times, client errors and exhausted retries are
//! logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use atlas_common::utils::chunked;
use atlas_domain::DeliveryTask;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::ports::CatalogDelivery;

/// Tuning for the delivery subsystem.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Tasks submitted together as one wave.
    pub batch_size: usize,
    /// Maximum in-flight delivery calls across the whole run.
    pub concurrency: usize,
    /// Extra attempts after the first transient failure.
    pub max_retries: usize,
    /// Pause between attempts for one task.
    pub retry_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 25,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome counters for one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Tasks acknowledged by the catalog.
    pub delivered: usize,
    /// Tasks dropped after a client error or exhausted retries.
    pub dropped: usize,
}

/// Delivers classified tasks to the catalog under a concurrency bound.
pub struct BoundedDispatcher {
    delivery: Arc<dyn CatalogDelivery>,
    semaphore: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl BoundedDispatcher {
    /// Create a dispatcher over the given delivery collaborator.
    pub fn new(delivery: Arc<dyn CatalogDelivery>, config: DispatcherConfig) -> Self {
        let config = DispatcherConfig {
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            ..config
        };
        Self { semaphore: Arc::new(Semaphore::new(config.concurrency)), delivery, config }
    }

    /// Deliver every task, in waves of `batch_size`.
    ///
    /// Returns counters for logging; individual failures are handled
    /// internally and never propagate.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn dispatch(&self, tasks: Vec<DeliveryTask>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        if tasks.is_empty() {
            return stats;
        }

        for wave in chunked(&tasks, self.config.batch_size) {
            let results = join_all(wave.into_iter().map(|task| self.deliver(task))).await;
            for delivered in results {
                if delivered {
                    stats.delivered += 1;
                } else {
                    stats.dropped += 1;
                }
            }
        }

        debug!(delivered = stats.delivered, dropped = stats.dropped, "dispatch wave set complete");
        stats
    }

    /// Deliver one task, retrying transient failures.
    async fn deliver(&self, task: DeliveryTask) -> bool {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(id = %task.id, "delivery semaphore closed, dropping task");
                return false;
            }
        };

        let mut attempt = 0usize;
        loop {
            match self
                .delivery
                .send(&task.payload, &task.id, task.operation, task.entity)
                .await
            {
                Ok(()) => {
                    debug!(
                        id = %task.id,
                        operation = task.operation.as_str(),
                        entity = task.entity.as_str(),
                        "delivered"
                    );
                    return true;
                }
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        id = %task.id,
                        attempt,
                        error = %err,
                        "transient delivery failure, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(id = %task.id, error = %err, "delivery retries exhausted, dropping task");
                    } else {
                        warn!(id = %task.id, error = %err, "catalog rejected task, dropping");
                    }
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use atlas_domain::{DeliveryOperation, EntityKind};
    use serde_json::{json, Value};

    use super::*;
    use crate::ports::DeliveryError;

    fn task(id: &str) -> DeliveryTask {
        DeliveryTask {
            payload: json!({ "resourceId": id }),
            id: id.to_string(),
            operation: DeliveryOperation::Upsert,
            entity: EntityKind::Resource,
        }
    }

    fn fast_config(concurrency: usize) -> DispatcherConfig {
        DispatcherConfig {
            concurrency,
            retry_delay: Duration::from_millis(1),
            ..DispatcherConfig::default()
        }
    }

    /// Fails the first `failures` calls per run with the given error kind,
    /// then succeeds. Tracks total calls and the high-water mark of
    /// concurrent calls.
    struct FlakyDelivery {
        failures: usize,
        transient: bool,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FlakyDelivery {
        fn new(failures: usize, transient: bool) -> Self {
            Self {
                failures,
                transient,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn succeeding() -> Self {
            Self::new(0, true)
        }
    }

    #[async_trait]
    impl CatalogDelivery for FlakyDelivery {
        async fn send(
            &self,
            _payload: &Value,
            _id: &str,
            _operation: DeliveryOperation,
            _entity: EntityKind,
        ) -> Result<(), DeliveryError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            // Yield so other wave members actually overlap.
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    Err(DeliveryError::Transient("503 from catalog".into()))
                } else {
                    Err(DeliveryError::Client("422 from catalog".into()))
                }
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn empty_task_list_makes_no_calls() {
        let delivery = Arc::new(FlakyDelivery::succeeding());
        let dispatcher = BoundedDispatcher::new(delivery.clone(), fast_config(4));

        let stats = dispatcher.dispatch(Vec::new()).await;

        assert_eq!(stats, DispatchStats::default());
        assert_eq!(delivery.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let delivery = Arc::new(FlakyDelivery::new(2, true));
        let dispatcher = BoundedDispatcher::new(delivery.clone(), fast_config(4));

        let stats = dispatcher.dispatch(vec![task("/r/a")]).await;

        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 0);
        // Two failures plus the successful third attempt.
        assert_eq!(delivery.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_transient_failure_drops_after_budget() {
        let delivery = Arc::new(FlakyDelivery::new(usize::MAX, true));
        let dispatcher = BoundedDispatcher::new(delivery.clone(), fast_config(4));

        let stats = dispatcher.dispatch(vec![task("/r/a")]).await;

        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 1);
        // Initial attempt plus the two-retry budget.
        assert_eq!(delivery.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let delivery = Arc::new(FlakyDelivery::new(usize::MAX, false));
        let dispatcher = BoundedDispatcher::new(delivery.clone(), fast_config(4));

        let stats = dispatcher.dispatch(vec![task("/r/a")]).await;

        assert_eq!(stats.dropped, 1);
        assert_eq!(delivery.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_do_not_block_other_tasks() {
        let delivery = Arc::new(FlakyDelivery::new(1, false));
        let dispatcher = BoundedDispatcher::new(delivery.clone(), fast_config(1));

        let stats = dispatcher.dispatch(vec![task("/r/a"), task("/r/b")]).await;

        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn hundred_fifty_tasks_run_as_two_waves() {
        let delivery = Arc::new(FlakyDelivery::succeeding());
        let dispatcher = BoundedDispatcher::new(
            delivery.clone(),
            DispatcherConfig { concurrency: 200, ..fast_config(200) },
        );

        let tasks: Vec<DeliveryTask> =
            (0..150).map(|i| task(&format!("/r/{i}"))).collect();
        let stats = dispatcher.dispatch(tasks).await;

        assert_eq!(stats.delivered, 150);
        assert_eq!(delivery.calls.load(Ordering::SeqCst), 150);
        // With 200 permits available, overlap is capped by the 100-task
        // wave, not the semaphore.
        assert!(delivery.max_in_flight.load(Ordering::SeqCst) <= 100);
    }

    #[tokio::test]
    async fn in_flight_calls_never_exceed_the_concurrency_limit() {
        let delivery = Arc::new(FlakyDelivery::succeeding());
        let dispatcher = BoundedDispatcher::new(delivery.clone(), fast_config(8));

        let tasks: Vec<DeliveryTask> =
            (0..60).map(|i| task(&format!("/r/{i}"))).collect();
        dispatcher.dispatch(tasks).await;

        assert!(delivery.max_in_flight.load(Ordering::SeqCst) <= 8);
    }
}
