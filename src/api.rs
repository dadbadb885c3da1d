//! The API client contract consumed by the stores.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use kube_core::params::Patch;
use kube_core::{ApiResource, Resource, WatchEvent};

use crate::Result;

pub mod dynamic;
pub use dynamic::DynamicApi;
pub mod link;
pub use link::{resource_name_for_kind, ApiLink};

/// A merge/strategic/apply patch body as sent to the API server.
pub type ObjectPatch = Patch<serde_json::Value>;

/// Describes the API serving one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDescriptor {
    pub resource: ApiResource,
    pub namespaced: bool,
}

impl ApiDescriptor {
    pub fn namespaced(resource: ApiResource) -> Self {
        Self {
            resource,
            namespaced: true,
        }
    }

    pub fn cluster(resource: ApiResource) -> Self {
        Self {
            resource,
            namespaced: false,
        }
    }

    /// Describes a statically typed resource.
    pub fn erase<K: Resource<DynamicType = ()>>(namespaced: bool) -> Self {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespaced,
        }
    }

    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> &str {
        &self.resource.api_version
    }

    pub fn api_prefix(&self) -> &'static str {
        if self.resource.group.is_empty() {
            "/api"
        } else {
            "/apis"
        }
    }

    /// The namespace-less collection path, e.g. `/apis/apps/v1/deployments`.
    pub fn api_base(&self) -> String {
        format!(
            "{}/{}/{}",
            self.api_prefix(),
            self.resource.api_version,
            self.resource.plural
        )
    }

    /// Formats the path of a single object. The namespace is dropped for cluster-scoped kinds.
    pub fn self_link(&self, namespace: Option<&str>, name: &str) -> String {
        ApiLink {
            api_prefix: self.api_prefix().to_owned(),
            api_version: self.resource.api_version.clone(),
            namespace: namespace
                .filter(|_| self.namespaced)
                .map(ToOwned::to_owned),
            resource: self.resource.plural.clone(),
            name: Some(name.to_owned()),
        }
        .to_url()
    }

    /// Formats the self-link of `object`, if it has a name.
    pub fn object_link<K: Resource>(&self, object: &K) -> Option<String> {
        let meta = object.meta();
        let name = meta.name.as_deref()?;
        Some(self.self_link(meta.namespace.as_deref(), name))
    }
}

/// Operations the cache layer needs from a Kubernetes API client for kind `K`.
///
/// `namespace` is `None` for cluster-scoped kinds and for listing across all namespaces.
pub trait ResourceClient<K>: Send + Sync {
    fn descriptor(&self) -> &ApiDescriptor;

    fn list<'a>(&'a self, namespace: Option<&'a str>) -> BoxFuture<'a, Result<Vec<K>>>;

    fn get<'a>(&'a self, namespace: Option<&'a str>, name: &'a str) -> BoxFuture<'a, Result<K>>;

    fn patch<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
        patch: &'a ObjectPatch,
    ) -> BoxFuture<'a, Result<K>>;

    fn delete<'a>(&'a self, namespace: Option<&'a str>, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Opens a watch connection. Dropping the stream closes it.
    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Result<WatchEvent<K>>>;
}
