//! kube-object-cache keeps in-memory, per-namespace collections of Kubernetes objects
//! in sync with the apiserver for many simultaneous consumers.
//!
//! A [`KubeObjectStore`] holds the objects of one resource type,
//! loaded per namespace through a [`ResourceClient`] and kept current by its watch stream.
//! Concurrent loads of the same namespace share one list request.
//! The [`ApiManager`] indexes stores and clients by API base path,
//! and is populated early through the buffering [`AutoRegistrar`],
//! e.g. with stores for every CRD discovered by [`CrdRegistration`].
//! [`KubeWatchApi`] reference-counts watch subscriptions,
//! so that there is at most one watch per (API, namespace) pair.
//!
//! The dock side keeps per-tab state in [`DockTabStore`]s
//! and pod log tails in the [`LogStore`].

pub mod api;
pub use api::{ApiDescriptor, ApiLink, DynamicApi, ResourceClient};
pub mod config;
pub use config::Config;
pub mod context;
pub use context::{ClusterContext, NamespaceScope};
pub mod dock;
pub use dock::{DockStore, DockTabStore};
mod error;
pub use error::{Error, Result};
pub mod logs;
pub use logs::LogStore;
pub mod registry;
pub use registry::crd::CrdRegistration;
pub use registry::{ApiManager, AutoRegistrar};
pub mod store;
pub use store::{KubeObjectStore, ObjectStore};
pub mod watch;
pub use watch::{KubeWatchApi, SubscribeOptions, WatchSubscription};
