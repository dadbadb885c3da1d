use std::collections::HashMap;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use super::{StorageHelper, TabDataStore, TabId};

/// Per-tab state of one dock feature, optionally persisted.
pub struct DockTabStore<T> {
    data: RwLock<HashMap<TabId, T>>,
    storage: Option<StorageHelper<HashMap<TabId, T>>>,
    revision: watch::Sender<u64>,
}

impl<T> Default for DockTabStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DockTabStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::build(HashMap::new(), None)
    }

    /// A store whose data is loaded from `storage` now and written back on every change.
    pub fn persistent(storage: StorageHelper<HashMap<TabId, T>>) -> Self {
        let data = storage.get();
        log::debug!("restored {} tab(s) from {}", data.len(), storage.key());
        Self::build(data, Some(storage))
    }

    fn build(data: HashMap<TabId, T>, storage: Option<StorageHelper<HashMap<TabId, T>>>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            data: RwLock::new(data),
            storage,
            revision,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn get_data(&self, tab_id: &str) -> Option<T> {
        self.data.read().get(tab_id).cloned()
    }

    pub fn has_data(&self, tab_id: &str) -> bool {
        self.data.read().contains_key(tab_id)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.data.read().keys().cloned().collect()
    }

    pub fn set_data(&self, tab_id: impl Into<TabId>, value: T) {
        self.mutate(|data| {
            data.insert(tab_id.into(), value);
        });
    }

    /// Changes the data of a tab in place. Returns `false` when the tab has no data.
    pub fn update_data(&self, tab_id: &str, update: impl FnOnce(&mut T)) -> bool {
        let mut updated = false;
        self.mutate(|data| {
            if let Some(value) = data.get_mut(tab_id) {
                update(value);
                updated = true;
            }
        });
        updated
    }

    pub fn clear_data(&self, tab_id: &str) {
        self.mutate(|data| {
            data.remove(tab_id);
        });
    }

    /// Drops every entry, including the persisted copy.
    pub fn reset(&self) {
        self.data.write().clear();
        if let Some(storage) = &self.storage {
            storage.reset();
        }
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn mutate(&self, change: impl FnOnce(&mut HashMap<TabId, T>)) {
        {
            let mut data = self.data.write();
            change(&mut data);
            if let Some(storage) = &self.storage {
                storage.set(&data);
            }
        }
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl<T> TabDataStore for DockTabStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn clear_data(&self, tab_id: &str) {
        DockTabStore::clear_data(self, tab_id);
    }
}
