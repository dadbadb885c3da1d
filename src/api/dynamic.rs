use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt, TryStreamExt};
use kube_client::api::{DeleteParams, ListParams, PatchParams};
use kube_client::{Api, Client};
use kube_core::{DynamicObject, WatchEvent};
use kube_runtime::{watcher, WatchStreamExt};

use super::{ApiDescriptor, ObjectPatch, ResourceClient};
use crate::Result;

/// [`ResourceClient`] backed by a live cluster, for any kind known only at runtime.
#[derive(Clone)]
pub struct DynamicApi {
    client: Client,
    descriptor: ApiDescriptor,
    watcher_config: watcher::Config,
}

impl DynamicApi {
    pub fn new(client: Client, descriptor: ApiDescriptor) -> Self {
        Self {
            client,
            descriptor,
            watcher_config: watcher::Config::default(),
        }
    }

    /// Overrides the configuration used for watch connections.
    pub fn with_watcher_config(mut self, config: watcher::Config) -> Self {
        self.watcher_config = config;
        self
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace.filter(|_| self.descriptor.namespaced) {
            Some(namespace) => {
                Api::namespaced_with(self.client.clone(), namespace, &self.descriptor.resource)
            }
            None => Api::all_with(self.client.clone(), &self.descriptor.resource),
        }
    }
}

impl ResourceClient<DynamicObject> for DynamicApi {
    fn descriptor(&self) -> &ApiDescriptor {
        &self.descriptor
    }

    fn list<'a>(&'a self, namespace: Option<&'a str>) -> BoxFuture<'a, Result<Vec<DynamicObject>>> {
        async move {
            let list = self.api(namespace).list(&ListParams::default()).await?;
            Ok(list.items)
        }
        .boxed()
    }

    fn get<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> BoxFuture<'a, Result<DynamicObject>> {
        async move { Ok(self.api(namespace).get(name).await?) }.boxed()
    }

    fn patch<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
        patch: &'a ObjectPatch,
    ) -> BoxFuture<'a, Result<DynamicObject>> {
        async move {
            let patched = self
                .api(namespace)
                .patch(name, &PatchParams::default(), patch)
                .await?;
            Ok(patched)
        }
        .boxed()
    }

    fn delete<'a>(&'a self, namespace: Option<&'a str>, name: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.api(namespace)
                .delete(name, &DeleteParams::default())
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Result<WatchEvent<DynamicObject>>> {
        // The runtime watcher re-lists after desyncs; re-listed objects are surfaced as additions
        // and merged by identity.
        watcher(self.api(namespace), self.watcher_config.clone())
            .default_backoff()
            .map_ok(|event| {
                let events = match event {
                    watcher::Event::Applied(object) => vec![WatchEvent::Modified(object)],
                    watcher::Event::Deleted(object) => vec![WatchEvent::Deleted(object)],
                    watcher::Event::Restarted(objects) => {
                        objects.into_iter().map(WatchEvent::Added).collect()
                    }
                };
                stream::iter(events).map(Ok::<_, watcher::Error>)
            })
            .try_flatten()
            .map_err(crate::Error::from)
            .boxed()
    }
}
