use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube_core::WatchEvent;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::{eventually, pod, FakeApi};
use crate::{KubeObjectStore, KubeWatchApi, NamespaceScope, ObjectStore, SubscribeOptions};

const PODS: &str = "/api/v1/pods";

fn object_store(api: &Arc<FakeApi>) -> (Arc<KubeObjectStore<Pod>>, Arc<dyn ObjectStore>) {
    let store = Arc::new(KubeObjectStore::new(api.client()));
    let erased: Arc<dyn ObjectStore> = Arc::clone(&store) as Arc<dyn ObjectStore>;
    (store, erased)
}

fn in_namespace(namespace: &str) -> SubscribeOptions {
    SubscribeOptions::new(NamespaceScope::selected([namespace]))
}

#[tokio::test]
async fn shared_watch_is_refcounted() {
    let api = FakeApi::new(vec![pod("a", "p1")]);
    let (store, erased) = object_store(&api);
    let watches = KubeWatchApi::new(Handle::current());

    let first = watches.subscribe_store(Arc::clone(&erased), in_namespace("a"));
    let second = watches.subscribe_store(Arc::clone(&erased), in_namespace("a"));
    eventually(|| api.open_watches(Some("a")) == 1).await;

    assert_eq!(watches.refcount(PODS, Some("a")), 2);
    assert_eq!(watches.active_watch_count(), 1);
    assert_eq!(api.list_calls().len(), 1);
    assert_eq!(api.watch_calls(), 1);
    assert!(store.is_loaded());

    drop(first);
    assert_eq!(watches.refcount(PODS, Some("a")), 1);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(api.open_watches(Some("a")), 1);

    second.dispose();
    assert_eq!(watches.refcount(PODS, Some("a")), 0);
    assert_eq!(watches.active_watch_count(), 0);
    eventually(|| api.total_open_watches() == 0).await;
}

#[tokio::test]
async fn resubscribing_opens_a_fresh_watch() {
    let api = FakeApi::new(Vec::new());
    let (_, erased) = object_store(&api);
    let watches = KubeWatchApi::new(Handle::current());

    let subscription = watches.subscribe_store(Arc::clone(&erased), in_namespace("a"));
    eventually(|| api.open_watches(Some("a")) == 1).await;
    drop(subscription);
    eventually(|| api.total_open_watches() == 0).await;

    let _subscription = watches.subscribe_store(erased, in_namespace("a"));
    eventually(|| api.open_watches(Some("a")) == 1).await;
    assert_eq!(api.watch_calls(), 2);
}

#[tokio::test]
async fn watch_starts_after_load() {
    let api = FakeApi::gated(vec![pod("a", "p1")]);
    let (store, erased) = object_store(&api);
    let watches = KubeWatchApi::new(Handle::current());

    let _subscription = watches.subscribe_store(erased, in_namespace("a"));
    eventually(|| api.list_calls().len() == 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(api.watch_calls(), 0);
    assert!(store.is_loading());

    api.release_lists();
    eventually(|| api.open_watches(Some("a")) == 1).await;
    assert_eq!(store.total_count(), 1);

    api.emit(WatchEvent::Added(pod("a", "p2")));
    eventually(|| store.total_count() == 2).await;
}

#[tokio::test]
async fn disposing_during_load_ends_loading() {
    let api = FakeApi::gated(vec![pod("a", "p1")]);
    let (store, erased) = object_store(&api);
    let watches = KubeWatchApi::new(Handle::current());

    let subscription = watches.subscribe_store(erased, in_namespace("a"));
    eventually(|| api.list_calls().len() == 1).await;
    assert!(store.is_loading());

    subscription.dispose();
    eventually(|| !store.is_loading()).await;

    api.release_lists();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!store.is_loading());
    assert!(!store.is_loaded());
    assert_eq!(api.watch_calls(), 0);
}

#[tokio::test]
async fn one_watch_per_namespace_and_store() {
    let pods = FakeApi::new(Vec::new());
    let (_, pod_store) = object_store(&pods);
    let watches = KubeWatchApi::new(Handle::current());

    let options = SubscribeOptions::new(NamespaceScope::selected(["a", "b"]));
    let _subscription = watches.subscribe_stores(&[Arc::clone(&pod_store), pod_store], options);
    eventually(|| pods.total_open_watches() == 2).await;

    assert_eq!(watches.refcount(PODS, Some("a")), 1);
    assert_eq!(watches.refcount(PODS, Some("b")), 1);
    assert_eq!(pods.open_watches(Some("a")), 1);
    assert_eq!(pods.open_watches(Some("b")), 1);
}

#[tokio::test]
async fn load_failure_is_reported_to_every_subscriber() {
    let api = FakeApi::new(Vec::new());
    api.fail_list(Some("a"));
    let (store, erased) = object_store(&api);
    let watches = KubeWatchApi::new(Handle::current());

    let failures = Arc::new(Mutex::new(Vec::new()));
    let options = in_namespace("a").on_load_failure({
        let failures = Arc::clone(&failures);
        move |err| failures.lock().push(("first", err.failed_namespace().map(ToOwned::to_owned)))
    });
    let _first = watches.subscribe_store(Arc::clone(&erased), options);
    eventually(|| failures.lock().len() == 1).await;
    assert!(store.failed_loading());
    assert_eq!(api.watch_calls(), 0);
    // The failed pair stays subscribed without a connection.
    assert_eq!(watches.active_watch_count(), 1);
    assert_eq!(api.total_open_watches(), 0);

    // A late subscriber sees the failure that already happened.
    let options = in_namespace("a").on_load_failure({
        let failures = Arc::clone(&failures);
        move |err| failures.lock().push(("second", err.failed_namespace().map(ToOwned::to_owned)))
    });
    let _second = watches.subscribe_store(erased, options);

    assert_eq!(
        *failures.lock(),
        [
            ("first", Some("a".to_owned())),
            ("second", Some("a".to_owned()))
        ]
    );
}

#[tokio::test]
async fn shutdown_closes_every_watch() {
    let api = FakeApi::new(Vec::new());
    let (_, erased) = object_store(&api);
    let watches = KubeWatchApi::new(Handle::current());

    let subscription = watches.subscribe_store(
        erased,
        SubscribeOptions::new(NamespaceScope::selected(["a", "b"])),
    );
    eventually(|| api.total_open_watches() == 2).await;

    watches.shutdown().await;

    assert_eq!(watches.active_watch_count(), 0);
    assert_eq!(api.total_open_watches(), 0);
    drop(subscription);
}
