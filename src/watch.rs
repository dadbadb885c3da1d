//! Reference-counted watch subscriptions shared by many consumers.
//!
//! Every `(store, namespace)` pair owns at most one background task, which first loads the
//! namespace into the store and then applies its watch stream. The task lives exactly as long as
//! at least one [`WatchSubscription`] refers to the pair.

use std::collections::{hash_map, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::context::NamespaceScope;
use crate::store::{ErrorSink, ObjectStore};
use crate::Error;

mod task;
use task::CancellableTask;

/// Called with load and watch failures of a subscription.
pub type FailureHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Parameters for [`KubeWatchApi::subscribe_stores`].
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    pub namespaces: NamespaceScope,
    pub on_load_failure: Option<FailureHandler>,
}

impl SubscribeOptions {
    pub fn new(namespaces: NamespaceScope) -> Self {
        Self {
            namespaces,
            on_load_failure: None,
        }
    }

    pub fn on_load_failure(mut self, handler: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_load_failure = Some(Arc::new(handler));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WatchKey {
    api_base: String,
    namespace: Option<String>,
}

struct WatchEntry {
    refcount: usize,
    /// Id of the subscription that created this entry; stale tasks compare against it.
    generation: u64,
    listeners: HashMap<u64, FailureHandler>,
    failure: Option<Arc<Error>>,
    task: CancellableTask<()>,
}

#[derive(Default)]
struct Subscriptions {
    next_id: u64,
    entries: HashMap<WatchKey, WatchEntry>,
}

/// Multiplexes store subscriptions onto the minimal set of watch connections.
pub struct KubeWatchApi {
    runtime: Handle,
    subscriptions: Arc<Mutex<Subscriptions>>,
}

impl KubeWatchApi {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            subscriptions: Arc::default(),
        }
    }

    pub fn subscribe_store(
        &self,
        store: Arc<dyn ObjectStore>,
        options: SubscribeOptions,
    ) -> WatchSubscription {
        self.subscribe_stores(&[store], options)
    }

    /// Subscribes to every store for the namespaces in `options`.
    ///
    /// Newly needed pairs are loaded and then watched in the background. Failures are delivered
    /// to `on_load_failure`, including failures that happened before this call on a pair that is
    /// already shared.
    pub fn subscribe_stores(
        &self,
        stores: &[Arc<dyn ObjectStore>],
        options: SubscribeOptions,
    ) -> WatchSubscription {
        let mut keys: Vec<WatchKey> = Vec::new();
        let mut earlier_failures = Vec::new();

        let id = {
            let mut subscriptions = self.subscriptions.lock();
            let id = subscriptions.next_id;
            subscriptions.next_id += 1;

            for store in stores {
                let descriptor = store.descriptor();
                for namespace in options.namespaces.keys(descriptor.namespaced) {
                    let key = WatchKey {
                        api_base: descriptor.api_base(),
                        namespace,
                    };
                    if keys.contains(&key) {
                        continue;
                    }

                    match subscriptions.entries.entry(key.clone()) {
                        hash_map::Entry::Occupied(mut entry) => {
                            let entry = entry.get_mut();
                            entry.refcount += 1;
                            if let Some(handler) = &options.on_load_failure {
                                entry.listeners.insert(id, Arc::clone(handler));
                                if let Some(failure) = &entry.failure {
                                    earlier_failures
                                        .push((Arc::clone(handler), Arc::clone(failure)));
                                }
                            }
                        }
                        hash_map::Entry::Vacant(entry) => {
                            log::debug!("opening watch for {key:?}");
                            let mut listeners = HashMap::new();
                            if let Some(handler) = &options.on_load_failure {
                                listeners.insert(id, Arc::clone(handler));
                            }
                            let task = self.spawn(Arc::clone(store), key.clone(), id);
                            entry.insert(WatchEntry {
                                refcount: 1,
                                generation: id,
                                listeners,
                                failure: None,
                                task,
                            });
                        }
                    }
                    keys.push(key);
                }
            }
            id
        };

        for (handler, failure) in earlier_failures {
            handler(&*failure);
        }

        WatchSubscription {
            id,
            keys,
            subscriptions: Arc::downgrade(&self.subscriptions),
        }
    }

    /// Number of subscribed `(API, namespace)` pairs.
    ///
    /// A pair whose load failed is counted but holds no watch connection; it is only retried
    /// once every subscriber has released it.
    pub fn active_watch_count(&self) -> usize {
        self.subscriptions.lock().entries.len()
    }

    /// Number of subscriptions sharing the watch of `api_base` in `namespace`.
    pub fn refcount(&self, api_base: &str, namespace: Option<&str>) -> usize {
        let key = WatchKey {
            api_base: api_base.to_owned(),
            namespace: namespace.map(ToOwned::to_owned),
        };
        self.subscriptions
            .lock()
            .entries
            .get(&key)
            .map_or(0, |entry| entry.refcount)
    }

    /// Closes every watch and waits for the background tasks to finish.
    pub async fn shutdown(&self) {
        let entries: Vec<WatchEntry> = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.task.cancel().await;
        }
    }

    fn spawn(&self, store: Arc<dyn ObjectStore>, key: WatchKey, generation: u64) -> CancellableTask<()> {
        let token = CancellationToken::new();
        let report = failure_reporter(Arc::downgrade(&self.subscriptions), key.clone(), generation);

        let join_handle = self.runtime.spawn({
            let token = token.clone();
            async move {
                let work = async {
                    let loaded = Arc::clone(&store).load_namespace(key.namespace.clone()).await;
                    match loaded {
                        // The watch only starts once the cache holds the namespace.
                        Ok(()) => store.watch_namespace(key.namespace.clone(), report).await,
                        Err(err) => report(err),
                    }
                };

                tokio::select! {
                    () = token.cancelled() => log::debug!("watch for {key:?} cancelled"),
                    () = work => log::debug!("watch for {key:?} ended"),
                }
            }
        });

        CancellableTask { join_handle, token }
    }
}

fn failure_reporter(
    subscriptions: Weak<Mutex<Subscriptions>>,
    key: WatchKey,
    generation: u64,
) -> ErrorSink {
    Arc::new(move |err: Error| {
        let Some(subscriptions) = subscriptions.upgrade() else {
            return;
        };
        let err = Arc::new(err);
        let listeners: Vec<FailureHandler> = {
            let mut subscriptions = subscriptions.lock();
            match subscriptions.entries.get_mut(&key) {
                Some(entry) if entry.generation == generation => {
                    entry.failure = Some(Arc::clone(&err));
                    entry.listeners.values().cloned().collect()
                }
                _ => return,
            }
        };

        log::warn!("watch for {key:?} failed: {err}");
        for listener in listeners {
            listener(&*err);
        }
    })
}

/// Keeps a set of watches open. Dropping it (or calling [`dispose`](Self::dispose)) releases them.
#[must_use = "dropping the subscription closes its watches"]
pub struct WatchSubscription {
    id: u64,
    keys: Vec<WatchKey>,
    subscriptions: Weak<Mutex<Subscriptions>>,
}

impl WatchSubscription {
    pub fn dispose(self) {}
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        let Some(subscriptions) = self.subscriptions.upgrade() else {
            return;
        };
        let mut subscriptions = subscriptions.lock();
        for key in self.keys.drain(..) {
            let hash_map::Entry::Occupied(mut entry) = subscriptions.entries.entry(key) else {
                continue;
            };
            let watch = entry.get_mut();
            watch.listeners.remove(&self.id);
            watch.refcount = watch.refcount.saturating_sub(1);
            if watch.refcount == 0 {
                log::debug!("closing watch for {:?}", entry.key());
                entry.remove().task.signal();
            }
        }
    }
}
