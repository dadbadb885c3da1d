//! Registration of APIs and stores for custom resources appearing at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube_client::{Api, Client};
use kube_core::{ApiResource, DynamicObject, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{reflector, watcher, WatchStreamExt};

use super::{AutoRegistrar, RegisteredApi, Registration};
use crate::api::{ApiDescriptor, DynamicApi, ResourceClient};
use crate::store::KubeObjectStore;
use crate::{Config, Result};

/// Describes the version of a CRD that clients should use: the storage version if it is
/// served, else the first served version.
pub fn preferred_descriptor(crd: &CustomResourceDefinition) -> Option<ApiDescriptor> {
    let spec = &crd.spec;
    let version = spec
        .versions
        .iter()
        .find(|version| version.served && version.storage)
        .or_else(|| spec.versions.iter().find(|version| version.served))?;

    let resource = ApiResource {
        group: spec.group.clone(),
        version: version.name.clone(),
        api_version: format!("{}/{}", spec.group, version.name),
        kind: spec.names.kind.clone(),
        plural: spec.names.plural.clone(),
    };
    Some(ApiDescriptor {
        resource,
        namespaced: spec.scope == "Namespaced",
    })
}

/// Watches CRDs and emits a [`DynamicApi`] plus a store for each one, and an unregistration
/// when the CRD goes away.
pub struct CrdRegistration {
    client: Client,
    registrar: Arc<AutoRegistrar>,
    watcher_config: watcher::Config,
    /// CRD name to the `apiBase` registered for it.
    registered: HashMap<String, String>,
}

impl CrdRegistration {
    pub fn new(client: Client, registrar: Arc<AutoRegistrar>, config: &Config) -> Self {
        Self {
            client,
            registrar,
            watcher_config: config.watcher_config(),
            registered: HashMap::new(),
        }
    }

    /// Runs until the CRD watch fails.
    pub async fn run(mut self) -> Result<()> {
        let crds = Api::<CustomResourceDefinition>::all(self.client.clone());
        let writer = reflector::store::Writer::new(());
        let store = writer.as_reader();

        let mut events = reflector(writer, watcher(crds, self.watcher_config.clone()))
            .touched_objects()
            .boxed();

        while let Some(crd) = events.try_next().await? {
            let exists = store.get(&ObjectRef::from_obj(&crd)).is_some();
            if exists {
                self.register(&crd);
            } else {
                self.unregister(&crd.name_any());
            }
        }
        Ok(())
    }

    fn register(&mut self, crd: &CustomResourceDefinition) {
        let name = crd.name_any();
        let Some(descriptor) = preferred_descriptor(crd) else {
            log::warn!("custom resource definition {name} serves no version");
            self.unregister(&name);
            return;
        };

        let api_base = descriptor.api_base();
        if self.registered.get(&name) == Some(&api_base) {
            return;
        }
        self.unregister(&name);

        log::info!("registering custom resource {api_base}");
        let client: Arc<dyn ResourceClient<DynamicObject>> = Arc::new(
            DynamicApi::new(self.client.clone(), descriptor)
                .with_watcher_config(self.watcher_config.clone()),
        );
        let store = Arc::new(KubeObjectStore::new(Arc::clone(&client)));

        self.registrar
            .emit(Registration::Api(RegisteredApi::new(client)));
        self.registrar.emit(Registration::Store(store));
        self.registered.insert(name, api_base);
    }

    fn unregister(&mut self, name: &str) {
        if let Some(api_base) = self.registered.remove(name) {
            log::info!("unregistering custom resource {api_base}");
            self.registrar.emit(Registration::Unregister(api_base));
        }
    }
}
