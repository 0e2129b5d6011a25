//! Query-text builders for the graph backend.
//!
//! The backend speaks a KQL-style pipeline language. This module builds the
//! four query shapes the engine uses (incremental/full, resources/resource
//! containers) and compiles [`TagFilterSet`]s into `| where` clauses that
//! can be spliced into the container queries.

use atlas_domain::TagFilterSet;

/// Compile a tag filter set into a `| where` clause.
///
/// Include pairs become case-insensitive per-tag equality tests combined
/// with AND; exclude pairs are combined with OR and wrapped in `not (...)`;
/// both groups, when present, are ANDed. Single quotes in keys and values
/// are escaped by doubling so the result stays embeddable in the query
/// language's string literals. An empty filter set compiles to the empty
/// string. Map iteration is lexicographic by key, so identical sets always
/// compile to identical text.
pub fn compile_tag_filter_clause(filters: &TagFilterSet) -> String {
    if !filters.has_filters() {
        return String::new();
    }

    let mut groups: Vec<String> = Vec::new();

    if !filters.include.is_empty() {
        let conditions: Vec<String> =
            filters.include.iter().map(|(key, value)| tag_equals(key, value)).collect();
        groups.push(format!("({})", conditions.join(" and ")));
    }

    if !filters.exclude.is_empty() {
        let conditions: Vec<String> =
            filters.exclude.iter().map(|(key, value)| tag_equals(key, value)).collect();
        groups.push(format!("not ({})", conditions.join(" or ")));
    }

    format!("| where {}", groups.join(" and "))
}

/// Case-insensitive equality test on one tag lookup.
fn tag_equals(key: &str, value: &str) -> String {
    format!("tostring(tags['{}']) =~ '{}'", escape_quotes(key), escape_quotes(value))
}

/// Escape a string for embedding in a single-quoted query literal.
fn escape_quotes(input: &str) -> String {
    input.replace('\'', "''")
}

/// Change-feed query for leaf resources.
///
/// Deduplicates to the latest change per resource id inside the window and
/// joins the current inventory for the descriptive columns; records for
/// resources that no longer exist come back with null inventory columns.
pub fn incremental_resources_query(window_minutes: u32) -> String {
    format!(
        r#"resourcechanges
| extend changeTime=todatetime(properties.changeAttributes.timestamp)
| extend targetResourceId=tostring(properties.targetResourceId)
| extend changeType=tostring(properties.changeType)
| project-away tags, name, type
| extend type=tostring(properties.targetResourceType)
| extend resourceId=tolower(targetResourceId)
| where changeTime > ago({window_minutes}m)
| summarize arg_max(changeTime, *) by resourceId
| join kind=leftouter (
    resources
    | extend sourceResourceId=tolower(id)
    | project sourceResourceId, name, location, tags, subscriptionId, resourceGroup
    | extend resourceGroup=tolower(resourceGroup)
) on $left.resourceId == $right.sourceResourceId
| project subscriptionId, resourceGroup, resourceId, sourceResourceId, name, tags, type, location, changeType, changeTime
| order by changeTime asc"#
    )
}

/// Full-inventory query for leaf resources.
pub fn full_resources_query() -> String {
    r#"resources
| extend resourceId=tolower(id)
| project resourceId, type, name, location, tags, subscriptionId, resourceGroup
| extend resourceGroup=tolower(resourceGroup)"#
        .to_string()
}

/// Change-feed query for resource containers, with optional tag filtering.
pub fn incremental_containers_query(window_minutes: u32, filters: &TagFilterSet) -> String {
    let filter_clause = compile_tag_filter_clause(filters);
    format!(
        r#"resourcecontainerchanges
| extend changeTime=todatetime(properties.changeAttributes.timestamp)
| extend changeType=tostring(properties.changeType)
| project-away tags, name, type
| extend type=tostring(properties.targetResourceType)
| extend resourceId=tolower(properties.targetResourceId)
| where changeTime > ago({window_minutes}m)
| summarize arg_max(changeTime, *) by resourceId
| join kind=leftouter (
    resourcecontainers
    | extend sourceResourceId=tolower(id)
    | project sourceResourceId, type, name, location, tags, subscriptionId, resourceGroup
) on $left.resourceId == $right.sourceResourceId
{filter_clause}
| project subscriptionId, resourceGroup, resourceId, sourceResourceId, name, tags, type, location, changeType, changeTime
| order by changeTime asc"#
    )
}

/// Full-inventory query for resource containers, with optional tag
/// filtering.
pub fn full_containers_query(filters: &TagFilterSet) -> String {
    let filter_clause = compile_tag_filter_clause(filters);
    format!(
        r#"resourcecontainers
| extend resourceId=tolower(id)
| project resourceId, type, name, location, tags, subscriptionId, resourceGroup
| extend resourceGroup=tolower(resourceGroup)
| extend type=tolower(type)
{filter_clause}"#
    )
}
