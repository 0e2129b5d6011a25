//! Inventory, change-feed, and delivery types.
//!
//! The graph backend returns rows as JSON objects; [`ChangeRecord`] is the
//! typed form of one row. Change-feed rows come from a left-outer join onto
//! the current inventory, so everything except the resource id may be null
//! for resources that no longer exist — those fields deserialize to their
//! defaults instead of failing the page.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Accept explicit JSON `null` wherever a missing key would also default.
fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One subscription discovered in the provider inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Opaque subscription identifier.
    pub subscription_id: String,
    /// Human-readable name.
    #[serde(default, deserialize_with = "null_to_default")]
    pub display_name: String,
    /// Provider-specific metadata carried through to the catalog untouched.
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

impl Subscription {
    /// Catalog payload for this subscription entity.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Classification of one change-feed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Create,
    Delete,
    /// Anything that is not a create or delete is treated as an update;
    /// unknown change types from the backend land here as well.
    Update,
}

impl<'de> Deserialize<'de> for ChangeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "Create" => Self::Create,
            "Delete" => Self::Delete,
            _ => Self::Update,
        })
    }
}

/// One resource or resource-container observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Canonical resource identifier (lower-cased before any grouping).
    pub resource_id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub subscription_id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub resource_group: String,
    #[serde(rename = "type", default, deserialize_with = "null_to_default")]
    pub resource_type: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub tags: BTreeMap<String, String>,
    /// Present in incremental mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeKind>,
    /// Present in incremental mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_time: Option<DateTime<Utc>>,
}

impl ChangeRecord {
    /// Lower-case the identifier fields used for grouping and joining.
    pub fn normalize(&mut self) {
        self.resource_id = self.resource_id.to_lowercase();
        self.resource_group = self.resource_group.to_lowercase();
    }

    /// Catalog payload for this record.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One page of records returned by the graph backend.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Records in backend order.
    pub records: Vec<ChangeRecord>,
    /// Continuation token for the next page, absent on the last page.
    pub next_cursor: Option<String>,
}

/// Include/exclude tag constraints for resource containers.
///
/// Empty maps mean "no constraint". `BTreeMap` fixes the iteration order so
/// compiled predicates are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilterSet {
    /// Tags a container must carry (combined with AND).
    #[serde(default)]
    pub include: BTreeMap<String, String>,
    /// Tags that disqualify a container (combined with OR, then negated).
    #[serde(default)]
    pub exclude: BTreeMap<String, String>,
}

impl TagFilterSet {
    /// True when at least one constraint is configured.
    pub fn has_filters(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }

    /// Parse the JSON form used in configuration.
    ///
    /// Unknown keys are ignored; a wrong shape (e.g. `include` not being a
    /// string map) is an error the caller is expected to degrade on.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Catalog operation carried by a delivery task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOperation {
    Upsert,
    Delete,
}

impl DeliveryOperation {
    /// Wire name expected by the catalog ingestion endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

/// Kind of catalog entity a delivery task addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Resource,
    ResourceContainer,
    Subscription,
}

impl EntityKind {
    /// Wire name expected by the catalog ingestion endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::ResourceContainer => "resourceContainer",
            Self::Subscription => "subscription",
        }
    }
}

/// One unit of work for the delivery subsystem.
///
/// Created by the reconciler (or directly by the orchestrator for
/// subscriptions and containers), consumed exactly once by the dispatcher.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    /// Entity body forwarded to the catalog.
    pub payload: Value,
    /// Catalog identity of the entity.
    pub id: String,
    /// Upsert or delete.
    pub operation: DeliveryOperation,
    /// Entity kind routed by the catalog.
    pub entity: EntityKind,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn change_record_tolerates_join_nulls() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "resourceId": "/subscriptions/s1/x",
            "subscriptionId": null,
            "resourceGroup": null,
            "type": null,
            "name": null,
            "location": null,
            "tags": null,
            "changeType": "Delete",
            "changeTime": "2026-01-12T08:30:00Z",
        }))
        .unwrap();

        assert_eq!(record.change_type, Some(ChangeKind::Delete));
        assert!(record.name.is_empty());
        assert!(record.tags.is_empty());
    }

    #[test]
    fn unknown_change_type_is_an_update() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "resourceId": "id",
            "changeType": "Annotate",
        }))
        .unwrap();

        assert_eq!(record.change_type, Some(ChangeKind::Update));
    }

    #[test]
    fn normalize_lowercases_grouping_fields() {
        let mut record: ChangeRecord = serde_json::from_value(json!({
            "resourceId": "/Subscriptions/S1/ResourceGroups/RG-A/x",
            "resourceGroup": "RG-A",
        }))
        .unwrap();

        record.normalize();
        assert_eq!(record.resource_id, "/subscriptions/s1/resourcegroups/rg-a/x");
        assert_eq!(record.resource_group, "rg-a");
    }

    #[test]
    fn payload_keeps_wire_field_names() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "resourceId": "id",
            "type": "microsoft.compute/virtualmachines",
        }))
        .unwrap();

        let payload = record.to_payload();
        assert_eq!(payload["resourceId"], "id");
        assert_eq!(payload["type"], "microsoft.compute/virtualmachines");
        // Incremental-only fields are omitted when absent.
        assert!(payload.get("changeType").is_none());
    }

    #[test]
    fn tag_filter_set_parses_include_and_exclude() {
        let filters =
            TagFilterSet::from_json(r#"{"include": {"Env": "prod"}, "exclude": {"Tmp": "true"}}"#)
                .unwrap();

        assert!(filters.has_filters());
        assert_eq!(filters.include.get("Env").map(String::as_str), Some("prod"));
        assert_eq!(filters.exclude.get("Tmp").map(String::as_str), Some("true"));
    }

    #[test]
    fn tag_filter_set_rejects_wrong_shapes() {
        assert!(TagFilterSet::from_json("not json at all").is_err());
        assert!(TagFilterSet::from_json(r#"{"include": "not a map"}"#).is_err());
    }

    #[test]
    fn tag_filter_set_ignores_unknown_keys() {
        let filters = TagFilterSet::from_json(r#"{"unrelated": "structure"}"#).unwrap();
        assert!(!filters.has_filters());
    }

    #[test]
    fn subscription_payload_flattens_metadata() {
        let sub: Subscription = serde_json::from_value(json!({
            "subscriptionId": "s1",
            "displayName": "Platform",
            "state": "Enabled",
        }))
        .unwrap();

        let payload = sub.to_payload();
        assert_eq!(payload["subscriptionId"], "s1");
        assert_eq!(payload["state"], "Enabled");
    }
}
