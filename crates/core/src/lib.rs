//! # Atlas Core
//!
//! The incremental synchronization engine: everything between "here is a
//! list of subscriptions" and "the catalog has been told about every
//! change". I/O happens only through the collaborator traits in [`ports`];
//! concrete HTTP clients live in `atlas-infra`.
//!
//! Data flow per run:
//! subscription batch → query text ([`kql`]) → paged records
//! ([`pagination`]) → classified tasks ([`reconcile`]) → delivered calls
//! ([`dispatch`]), driven top-down by [`orchestrator`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod dispatch;
pub mod kql;
pub mod orchestrator;
pub mod pagination;
pub mod ports;
pub mod reconcile;

pub use dispatch::{BoundedDispatcher, DispatchStats, DispatcherConfig};
pub use orchestrator::SyncOrchestrator;
pub use pagination::PagedQueryRunner;
pub use ports::{
    CatalogDelivery, DeliveryError, GraphQueryExecutor, InventoryDiscovery, QueryError,
};
pub use reconcile::{ChangeReconciler, ContainerKey, ReconcileOutcome};
