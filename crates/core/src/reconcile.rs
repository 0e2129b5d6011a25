//! Change classification and fan-out.
//!
//! Turns one page of raw records into delivery tasks: deletes for records
//! whose change feed says `Delete`, upserts for everything else, plus the
//! distinct parent containers observed in the page so the orchestrator can
//! keep their catalog entries alive.

use std::collections::BTreeSet;

use atlas_domain::{ChangeKind, ChangeRecord, DeliveryOperation, DeliveryTask, EntityKind};
use serde_json::json;
use tracing::debug;

/// Identity of one resource container within a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerKey {
    pub subscription_id: String,
    pub resource_group: String,
}

impl ContainerKey {
    /// Canonical (lower-cased) provider id for the container.
    pub fn canonical_id(&self) -> String {
        format!("/subscriptions/{}/resourcegroups/{}", self.subscription_id, self.resource_group)
    }

    /// Build the derived upsert task for this container.
    pub fn to_task(&self) -> DeliveryTask {
        let id = self.canonical_id();
        DeliveryTask {
            payload: json!({
                "resourceId": id,
                "subscriptionId": self.subscription_id,
                "resourceGroup": self.resource_group,
                "type": "microsoft.resources/subscriptions/resourcegroups",
            }),
            id,
            operation: DeliveryOperation::Upsert,
            entity: EntityKind::ResourceContainer,
        }
    }
}

/// Classified output of one page.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Upsert tasks, in record order.
    pub upserts: Vec<DeliveryTask>,
    /// Delete tasks, in record order.
    pub deletes: Vec<DeliveryTask>,
    /// Distinct parent containers observed in the page (resources only),
    /// deduplicated within the page.
    pub containers: Vec<ContainerKey>,
}

impl ReconcileOutcome {
    /// Total number of delivery tasks in the outcome.
    pub fn task_count(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }
}

/// Classifies pages of one entity kind into delivery tasks.
pub struct ChangeReconciler {
    entity: EntityKind,
}

impl ChangeReconciler {
    /// Reconciler for leaf resources; derives parent container keys.
    pub fn resources() -> Self {
        Self { entity: EntityKind::Resource }
    }

    /// Reconciler for resource containers.
    pub fn containers() -> Self {
        Self { entity: EntityKind::ResourceContainer }
    }

    /// Classify one page of records.
    ///
    /// Identifier fields are lower-cased before grouping. An empty page
    /// yields an empty outcome; the caller must not issue delivery calls
    /// for it.
    pub fn reconcile(&self, page: Vec<ChangeRecord>) -> ReconcileOutcome {
        if page.is_empty() {
            debug!(entity = self.entity.as_str(), "empty page, nothing to reconcile");
            return ReconcileOutcome::default();
        }

        let mut outcome = ReconcileOutcome::default();
        let mut containers: BTreeSet<ContainerKey> = BTreeSet::new();

        for mut record in page {
            record.normalize();

            if self.entity == EntityKind::Resource
                && !record.resource_group.is_empty()
                && !record.subscription_id.is_empty()
            {
                containers.insert(ContainerKey {
                    subscription_id: record.subscription_id.clone(),
                    resource_group: record.resource_group.clone(),
                });
            }

            let operation = match record.change_type {
                Some(ChangeKind::Delete) => DeliveryOperation::Delete,
                // Creates, updates, and full-sync records (no change type)
                // all upsert.
                _ => DeliveryOperation::Upsert,
            };

            let task = DeliveryTask {
                id: record.resource_id.clone(),
                payload: record.to_payload(),
                operation,
                entity: self.entity,
            };

            match operation {
                DeliveryOperation::Upsert => outcome.upserts.push(task),
                DeliveryOperation::Delete => outcome.deletes.push(task),
            }
        }

        outcome.containers = containers.into_iter().collect();
        outcome
    }
}
