//! Registry resolving API paths and self-links to the APIs and stores serving them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::{resource_name_for_kind, ApiDescriptor, ApiLink, ResourceClient};
use crate::store::{KubeObjectStore, ObjectStore};

mod auto;
pub use auto::{AutoRegistrar, Registration};
pub mod crd;

/// A registered API, type-erased so APIs of different kinds share one map.
#[derive(Clone)]
pub struct RegisteredApi {
    descriptor: ApiDescriptor,
    client: Arc<dyn Any + Send + Sync>,
}

impl RegisteredApi {
    pub fn new<K: 'static>(client: Arc<dyn ResourceClient<K>>) -> Self {
        Self {
            descriptor: client.descriptor().clone(),
            client: Arc::new(client),
        }
    }

    pub fn descriptor(&self) -> &ApiDescriptor {
        &self.descriptor
    }

    /// The client, if it serves objects of type `K`.
    pub fn client<K: 'static>(&self) -> Option<Arc<dyn ResourceClient<K>>> {
        self.client
            .downcast_ref::<Arc<dyn ResourceClient<K>>>()
            .cloned()
    }
}

/// A partial reference to another object, e.g. an owner reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectReference {
    pub kind: String,
    /// Defaults to `v1` when absent.
    pub api_version: Option<String>,
    pub name: String,
    /// Falls back to the namespace of the referring object.
    pub namespace: Option<String>,
}

/// Maps `apiBase`s to the API client and the store responsible for them.
#[derive(Default)]
pub struct ApiManager {
    apis: RwLock<HashMap<String, RegisteredApi>>,
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ApiManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry and attaches it to `registrar`, applying everything buffered so far.
    pub fn with_auto_registration(registrar: &AutoRegistrar) -> crate::Result<Arc<Self>> {
        let manager = Arc::new(Self::new());
        registrar.attach(Arc::clone(&manager))?;
        Ok(manager)
    }

    /// Registers an API, replacing any API already registered for the same `apiBase`.
    pub fn register_api(&self, api: RegisteredApi) {
        let api_base = api.descriptor.api_base();
        log::debug!("registering api {api_base}");
        self.apis.write().insert(api_base, api);
    }

    pub fn register_client<K: 'static>(&self, client: Arc<dyn ResourceClient<K>>) {
        self.register_api(RegisteredApi::new(client));
    }

    /// Registers a store under its API's `apiBase`, replacing any previous store.
    pub fn register_store(&self, store: Arc<dyn ObjectStore>) {
        let api_base = store.descriptor().api_base();
        log::debug!("registering store {api_base}");
        self.stores.write().insert(api_base, store);
    }

    /// Removes the API and the store registered for `api_base`.
    pub fn unregister(&self, api_base: &str) {
        log::debug!("unregistering {api_base}");
        self.apis.write().remove(api_base);
        self.stores.write().remove(api_base);
    }

    pub fn unregister_api(&self, api_base: &str) {
        self.apis.write().remove(api_base);
    }

    pub fn unregister_store(&self, api_base: &str) {
        self.stores.write().remove(api_base);
    }

    pub fn apis(&self) -> Vec<RegisteredApi> {
        self.apis.read().values().cloned().collect()
    }

    /// Resolves a self-link or `apiBase` to its API.
    pub fn get_api(&self, link: &str) -> Option<RegisteredApi> {
        let apis = self.apis.read();
        resolve(&apis, link).cloned()
    }

    /// First registered API matching `predicate`.
    pub fn find_api(&self, predicate: impl Fn(&ApiDescriptor) -> bool) -> Option<RegisteredApi> {
        self.apis
            .read()
            .values()
            .find(|api| predicate(&api.descriptor))
            .cloned()
    }

    pub fn get_typed_api<K: 'static>(&self, link: &str) -> Option<Arc<dyn ResourceClient<K>>> {
        self.get_api(link)?.client()
    }

    /// Resolves a self-link or `apiBase` to its store.
    pub fn get_store(&self, link: &str) -> Option<Arc<dyn ObjectStore>> {
        let stores = self.stores.read();
        resolve(&stores, link).cloned()
    }

    pub fn get_typed_store<K>(&self, link: &str) -> Option<Arc<KubeObjectStore<K>>>
    where
        K: kube_core::Resource + Send + Sync + 'static,
    {
        self.get_store(link)?
            .into_any()
            .downcast::<KubeObjectStore<K>>()
            .ok()
    }

    /// Builds a best-effort self-link for `reference`. The target may not exist.
    pub fn lookup_api_link(&self, reference: &ObjectReference, parent_namespace: Option<&str>) -> String {
        let api_version = reference.api_version.as_deref().unwrap_or("v1");
        let namespace = reference
            .namespace
            .as_deref()
            .or(parent_namespace);

        if reference.kind.is_empty() {
            return String::new();
        }

        if let Some(api) =
            self.find_api(|api| api.kind() == reference.kind && api.api_version() == api_version)
        {
            return api.descriptor.self_link(namespace, &reference.name);
        }

        let resource = resource_name_for_kind(&reference.kind);
        for api_prefix in ["/apis", "/api"] {
            let link = ApiLink {
                api_prefix: api_prefix.to_owned(),
                api_version: api_version.to_owned(),
                namespace: namespace.map(ToOwned::to_owned),
                resource: resource.clone(),
                name: Some(reference.name.clone()),
            };
            if self.apis.read().contains_key(&link.api_base()) {
                return link.to_url();
            }
        }

        // Older api versions, e.g. from autoscaler targets, still resolve by kind.
        if let Some(api) = self.find_api(|api| api.kind() == reference.kind) {
            return api.descriptor.self_link(namespace, &reference.name);
        }

        let api_prefix = if api_version.contains('/') { "/apis" } else { "/api" };
        ApiLink {
            api_prefix: api_prefix.to_owned(),
            api_version: api_version.to_owned(),
            namespace: namespace.map(ToOwned::to_owned),
            resource,
            name: Some(reference.name.clone()),
        }
        .to_url()
    }
}

/// Exact `apiBase` match on the parsed link, falling back to the longest registered prefix.
fn resolve<'a, V>(entries: &'a HashMap<String, V>, link: &str) -> Option<&'a V> {
    if let Some(entry) = ApiLink::parse(link)
        .ok()
        .and_then(|parsed| entries.get(&parsed.api_base()))
    {
        return Some(entry);
    }

    entries
        .iter()
        .filter(|(api_base, _)| {
            link.strip_prefix(api_base.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
        })
        .max_by_key(|(api_base, _)| api_base.len())
        .map(|(_, entry)| entry)
}
