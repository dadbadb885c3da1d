//! Per-kind observable object caches.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, StreamExt};
use kube_core::{Resource, WatchEvent};
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::api::{ApiDescriptor, ObjectPatch, ResourceClient};
use crate::context::NamespaceScope;
use crate::{Error, Result};

mod pending;
use pending::PendingLists;

/// A locally cached, observable collection of objects of one kind.
pub struct KubeObjectStore<K> {
    api: Arc<dyn ResourceClient<K>>,
    state: RwLock<StoreState<K>>,
    pending: PendingLists<K>,
    revision: watch::Sender<u64>,
}

struct StoreState<K> {
    items: Vec<Arc<K>>,
    selected: HashSet<String>,
    loading: usize,
    is_loaded: bool,
    failed_loading: bool,
    /// Request keys that have been listed successfully; `None` is cluster-wide.
    loaded: HashSet<Option<String>>,
    context: NamespaceScope,
}

impl<K> StoreState<K> {
    fn accepts(&self, namespace: Option<&str>) -> bool {
        match namespace {
            None => true,
            Some(namespace) => {
                self.loaded.contains(&None) || self.loaded.contains(&Some(namespace.to_owned()))
            }
        }
    }
}

/// Counts one running load until dropped, so a load cancelled mid-request still ends.
struct LoadingGuard<'a, K> {
    state: &'a RwLock<StoreState<K>>,
    revision: &'a watch::Sender<u64>,
}

impl<'a, K> LoadingGuard<'a, K> {
    fn enter(store: &'a KubeObjectStore<K>) -> Self {
        store.state.write().loading += 1;
        store.revision.send_modify(|revision| *revision += 1);
        Self {
            state: &store.state,
            revision: &store.revision,
        }
    }
}

impl<K> Drop for LoadingGuard<'_, K> {
    fn drop(&mut self) {
        self.state.write().loading -= 1;
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl<K> KubeObjectStore<K>
where
    K: Resource + Send + Sync + 'static,
{
    pub fn new(api: Arc<dyn ResourceClient<K>>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            api,
            state: RwLock::new(StoreState {
                items: Vec::new(),
                selected: HashSet::new(),
                loading: 0,
                is_loaded: false,
                failed_loading: false,
                loaded: HashSet::new(),
                context: NamespaceScope::All,
            }),
            pending: PendingLists::new(),
            revision,
        }
    }

    pub fn api(&self) -> &Arc<dyn ResourceClient<K>> {
        &self.api
    }

    pub fn descriptor(&self) -> &ApiDescriptor {
        self.api.descriptor()
    }

    /// Identity used for lookups and watch-event correlation: the uid, else the self-link.
    pub fn object_id(&self, object: &K) -> String {
        let meta = object.meta();
        meta.uid
            .clone()
            .or_else(|| self.descriptor().object_link(object))
            .unwrap_or_default()
    }

    /// Receiver that observes a new revision after every mutation.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn items(&self) -> Vec<Arc<K>> {
        self.state.read().items.clone()
    }

    /// Items inside the context namespaces, plus every cluster-scoped item.
    pub fn context_items(&self) -> Vec<Arc<K>> {
        let state = self.state.read();
        state
            .items
            .iter()
            .filter(|item| match item.meta().namespace.as_deref() {
                Some(namespace) => state.context.contains(namespace),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn set_context_namespaces(&self, scope: NamespaceScope) {
        self.state.write().context = scope;
        self.notify();
    }

    pub fn total_count(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().is_loaded
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading > 0
    }

    pub fn failed_loading(&self) -> bool {
        self.state.read().failed_loading
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<K>> {
        self.state
            .read()
            .items
            .iter()
            .find(|item| self.object_id(item) == id)
            .cloned()
    }

    pub fn get_by_name(&self, name: &str, namespace: Option<&str>) -> Option<Arc<K>> {
        self.state
            .read()
            .items
            .iter()
            .find(|item| {
                let meta = item.meta();
                meta.name.as_deref() == Some(name)
                    && (namespace.is_none() || meta.namespace.as_deref() == namespace)
            })
            .cloned()
    }

    pub fn get_by_path(&self, self_link: &str) -> Option<Arc<K>> {
        let descriptor = self.descriptor();
        self.state
            .read()
            .items
            .iter()
            .find(|item| descriptor.object_link::<K>(item).as_deref() == Some(self_link))
            .cloned()
    }

    pub fn get_all_by_ns(&self, namespaces: &[&str]) -> Vec<Arc<K>> {
        self.state
            .read()
            .items
            .iter()
            .filter(|item| {
                item.meta()
                    .namespace
                    .as_deref()
                    .is_some_and(|namespace| namespaces.contains(&namespace))
            })
            .cloned()
            .collect()
    }

    /// Lists every namespace in `scope`, one request per namespace, and replaces the cached
    /// items of those namespaces with the results.
    ///
    /// Requests already in flight for a namespace are joined instead of repeated. If any
    /// namespace fails, the cache is left untouched and `failed_loading` is set.
    pub async fn load_all(&self, scope: &NamespaceScope) -> Result<Vec<Arc<K>>> {
        let keys = scope.keys(self.descriptor().namespaced);
        let loading = LoadingGuard::enter(self);

        let outcomes = join_all(
            keys.iter()
                .map(|key| self.pending.list(&self.api, key.clone())),
        )
        .await;

        let mut batches = Vec::with_capacity(keys.len());
        let mut failure = None;
        for (key, outcome) in keys.into_iter().zip(outcomes) {
            match outcome {
                Ok(items) => batches.push((key, items)),
                Err(source) => {
                    failure.get_or_insert(Error::Load {
                        namespace: key,
                        source,
                    });
                }
            }
        }

        let result = {
            let mut state = self.state.write();
            match failure {
                Some(err) => {
                    state.failed_loading = true;
                    Err(err)
                }
                None => {
                    let mut loaded = Vec::new();
                    for (key, mut items) in batches {
                        match &key {
                            None => state.items.clear(),
                            Some(namespace) => state.items.retain(|item| {
                                item.meta().namespace.as_deref() != Some(namespace.as_str())
                            }),
                        }
                        items.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));
                        for item in &items {
                            self.upsert(&mut state.items, Arc::clone(item));
                        }
                        state.loaded.insert(key);
                        loaded.extend(items);
                    }
                    state.is_loaded = true;
                    state.failed_loading = false;
                    Ok(loaded)
                }
            }
        };
        drop(loading);

        match &result {
            Ok(items) => log::debug!(
                "loaded {} {} object(s)",
                items.len(),
                self.descriptor().kind()
            ),
            Err(err) => log::warn!("failed to load {}: {err}", self.descriptor().kind()),
        }
        result
    }

    /// Fetches a single object and upserts it into the cache.
    pub async fn load(&self, namespace: Option<&str>, name: &str) -> Result<Arc<K>> {
        let object = Arc::new(self.api.get(namespace, name).await?);
        {
            let mut state = self.state.write();
            self.upsert(&mut state.items, Arc::clone(&object));
        }
        self.notify();
        Ok(object)
    }

    /// Patches `object` on the server, then replaces the cached copy with the server's result.
    pub async fn patch(&self, object: &K, patch: &ObjectPatch) -> Result<Arc<K>> {
        let meta = object.meta();
        let name = self.require_name(object)?;
        let updated = Arc::new(
            self.api
                .patch(meta.namespace.as_deref(), name, patch)
                .await?,
        );

        let id = self.object_id(object);
        {
            let mut state = self.state.write();
            if let Some(slot) = state
                .items
                .iter_mut()
                .find(|item| self.object_id(item) == id)
            {
                *slot = Arc::clone(&updated);
            }
        }
        self.notify();
        Ok(updated)
    }

    /// Deletes `object` on the server, then drops it from the cache and the selection.
    pub async fn remove(&self, object: &K) -> Result<()> {
        let name = self.require_name(object)?;
        self.api
            .delete(object.meta().namespace.as_deref(), name)
            .await?;

        let id = self.object_id(object);
        {
            let mut state = self.state.write();
            state.items.retain(|item| self.object_id(item) != id);
            state.selected.remove(&id);
        }
        self.notify();
        Ok(())
    }

    /// Removes every object, returning the first failure after all deletions were attempted.
    pub async fn remove_items(&self, objects: &[Arc<K>]) -> Result<()> {
        let outcomes = join_all(objects.iter().map(|object| self.remove(object))).await;
        outcomes.into_iter().collect()
    }

    pub async fn remove_selected_items(&self) -> Result<()> {
        let selected = self.selected_items();
        self.remove_items(&selected).await
    }

    /// Applies one watch event. Events must be fed in the order the transport delivered them.
    pub fn apply_event(&self, event: WatchEvent<K>) {
        match event {
            WatchEvent::Added(object) | WatchEvent::Modified(object) => {
                let mut state = self.state.write();
                if !state.accepts(object.meta().namespace.as_deref()) {
                    return;
                }
                self.upsert(&mut state.items, Arc::new(object));
            }
            WatchEvent::Deleted(object) => {
                let id = self.object_id(&object);
                let mut state = self.state.write();
                state.items.retain(|item| self.object_id(item) != id);
                state.selected.remove(&id);
            }
            WatchEvent::Bookmark(_) => return,
            WatchEvent::Error(err) => {
                log::warn!("{} watch reported an error: {err:?}", self.descriptor().kind());
                return;
            }
        }
        self.notify();
    }

    /// Streams watch events for one namespace key into the cache until the connection ends.
    pub async fn watch(&self, namespace: Option<&str>, on_error: impl Fn(Error)) {
        let mut events = self.api.watch(namespace);
        log::debug!(
            "watching {} in {}",
            self.descriptor().api_base(),
            namespace.unwrap_or("all namespaces")
        );

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => self.apply_event(event),
                Err(err) => {
                    log::warn!("{} watch failed: {err}", self.descriptor().api_base());
                    on_error(err);
                }
            }
        }
        log::debug!("watch of {} closed", self.descriptor().api_base());
    }

    pub fn is_selected(&self, object: &K) -> bool {
        let id = self.object_id(object);
        self.state.read().selected.contains(&id)
    }

    pub fn select(&self, object: &K) {
        let id = self.object_id(object);
        self.state.write().selected.insert(id);
        self.notify();
    }

    pub fn unselect(&self, object: &K) {
        let id = self.object_id(object);
        self.state.write().selected.remove(&id);
        self.notify();
    }

    pub fn toggle_selection(&self, object: &K) {
        let id = self.object_id(object);
        {
            let mut state = self.state.write();
            if !state.selected.remove(&id) {
                state.selected.insert(id);
            }
        }
        self.notify();
    }

    /// Selects all of `objects`, or unselects them if they are all selected already.
    pub fn toggle_selection_all(&self, objects: &[Arc<K>]) {
        let ids: Vec<String> = objects.iter().map(|object| self.object_id(object)).collect();
        {
            let mut state = self.state.write();
            if ids.iter().all(|id| state.selected.contains(id)) {
                for id in &ids {
                    state.selected.remove(id);
                }
            } else {
                state.selected.extend(ids);
            }
        }
        self.notify();
    }

    pub fn pick_only_selected(&self, objects: &[Arc<K>]) -> Vec<Arc<K>> {
        let state = self.state.read();
        objects
            .iter()
            .filter(|object| state.selected.contains(&self.object_id(object)))
            .cloned()
            .collect()
    }

    pub fn selected_items(&self) -> Vec<Arc<K>> {
        let state = self.state.read();
        state
            .items
            .iter()
            .filter(|item| state.selected.contains(&self.object_id(item)))
            .cloned()
            .collect()
    }

    pub fn reset_selection(&self) {
        self.state.write().selected.clear();
        self.notify();
    }

    /// Forgets every item and flag, e.g. when the cluster frame goes away.
    pub fn reset(&self) {
        {
            let mut state = self.state.write();
            state.items.clear();
            state.selected.clear();
            state.loaded.clear();
            state.is_loaded = false;
            state.failed_loading = false;
        }
        self.notify();
    }

    fn upsert(&self, items: &mut Vec<Arc<K>>, object: Arc<K>) {
        let id = self.object_id(&object);
        match items.iter_mut().find(|item| self.object_id(item) == id) {
            Some(slot) => *slot = object,
            None => items.push(object),
        }
    }

    fn require_name<'a>(&self, object: &'a K) -> Result<&'a str> {
        object.meta().name.as_deref().ok_or_else(|| {
            Error::Rejected(format!("{} object has no name", self.descriptor().kind()))
        })
    }
}

/// Receives errors raised while a store watch is running.
pub type ErrorSink = Arc<dyn Fn(Error) + Send + Sync>;

/// Type-erased view of a [`KubeObjectStore`], as held by the registry and the watch coordinator.
pub trait ObjectStore: Send + Sync + 'static {
    fn descriptor(&self) -> &ApiDescriptor;

    fn is_loaded(&self) -> bool;

    fn is_loading(&self) -> bool;

    fn failed_loading(&self) -> bool;

    fn total_count(&self) -> usize;

    /// Loads one request key: `None` lists cluster-wide.
    fn load_namespace(self: Arc<Self>, namespace: Option<String>) -> BoxFuture<'static, Result<()>>;

    /// Applies watch events for one request key until the stream ends or the future is dropped.
    fn watch_namespace(
        self: Arc<Self>,
        namespace: Option<String>,
        on_error: ErrorSink,
    ) -> BoxFuture<'static, ()>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K> ObjectStore for KubeObjectStore<K>
where
    K: Resource + Send + Sync + 'static,
{
    fn descriptor(&self) -> &ApiDescriptor {
        self.api.descriptor()
    }

    fn is_loaded(&self) -> bool {
        self.state.read().is_loaded
    }

    fn is_loading(&self) -> bool {
        self.state.read().loading > 0
    }

    fn failed_loading(&self) -> bool {
        self.state.read().failed_loading
    }

    fn total_count(&self) -> usize {
        self.state.read().items.len()
    }

    fn load_namespace(self: Arc<Self>, namespace: Option<String>) -> BoxFuture<'static, Result<()>> {
        async move {
            let scope = match namespace {
                Some(namespace) => NamespaceScope::selected([namespace]),
                None => NamespaceScope::All,
            };
            self.load_all(&scope).await.map(|_| ())
        }
        .boxed()
    }

    fn watch_namespace(
        self: Arc<Self>,
        namespace: Option<String>,
        on_error: ErrorSink,
    ) -> BoxFuture<'static, ()> {
        async move {
            self.watch(namespace.as_deref(), |err| on_error(err)).await;
        }
        .boxed()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
