use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::api::ResourceClient;
use crate::Error;

pub(crate) type ListOutcome<K> = Result<Vec<Arc<K>>, Arc<Error>>;
type SharedList<K> = Shared<BoxFuture<'static, ListOutcome<K>>>;

/// In-flight list requests, at most one per namespace key.
pub(crate) struct PendingLists<K> {
    inflight: Mutex<Inflight<K>>,
}

struct Inflight<K> {
    next_id: u64,
    requests: HashMap<Option<String>, (u64, SharedList<K>)>,
}

impl<K> PendingLists<K>
where
    K: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            inflight: Mutex::new(Inflight {
                next_id: 0,
                requests: HashMap::new(),
            }),
        }
    }

    /// Lists `key`, joining the request already in flight for it if there is one.
    pub(crate) async fn list(
        &self,
        api: &Arc<dyn ResourceClient<K>>,
        key: Option<String>,
    ) -> ListOutcome<K> {
        let (id, request) = {
            let mut inflight = self.inflight.lock();
            match inflight.requests.get(&key) {
                Some((id, request)) => {
                    log::debug!("joining in-flight list of {}", describe(&key));
                    (*id, request.clone())
                }
                None => {
                    let id = inflight.next_id;
                    inflight.next_id += 1;

                    let api = Arc::clone(api);
                    let namespace = key.clone();
                    let request: SharedList<K> = async move {
                        match api.list(namespace.as_deref()).await {
                            Ok(items) => Ok(items.into_iter().map(Arc::new).collect()),
                            Err(err) => Err(Arc::new(err)),
                        }
                    }
                    .boxed()
                    .shared();

                    inflight.requests.insert(key.clone(), (id, request.clone()));
                    (id, request)
                }
            }
        };

        let outcome = request.await;

        let mut inflight = self.inflight.lock();
        if matches!(inflight.requests.get(&key), Some((current, _)) if *current == id) {
            inflight.requests.remove(&key);
        }
        outcome
    }
}

fn describe(key: &Option<String>) -> String {
    match key {
        Some(namespace) => format!("namespace {namespace}"),
        None => "all namespaces".to_owned(),
    }
}
