//! Dock tabs and the per-tab state attached to them.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

mod storage;
pub use storage::{JsonFileBackend, MemoryBackend, StorageBackend, StorageHelper};
mod tab_store;
pub use tab_store::DockTabStore;

pub type TabId = String;

/// Smallest height the dock can be resized to.
pub const MIN_DOCK_HEIGHT: u32 = 100;
const DEFAULT_DOCK_HEIGHT: u32 = 300;

/// State that must be dropped when its tab closes.
pub trait TabDataStore: Send + Sync {
    fn clear_data(&self, tab_id: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TabKind {
    Terminal,
    CreateResource,
    EditResource,
    InstallChart,
    UpgradeChart,
    PodLogs,
}

impl TabKind {
    fn default_title(self) -> &'static str {
        match self {
            TabKind::Terminal => "Terminal",
            TabKind::CreateResource => "Create resource",
            TabKind::EditResource => "Edit resource",
            TabKind::InstallChart => "Install chart",
            TabKind::UpgradeChart => "Upgrade chart",
            TabKind::PodLogs => "Logs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockTab {
    pub id: TabId,
    pub kind: TabKind,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DockState {
    height: u32,
    is_open: bool,
    tabs: Vec<DockTab>,
    selected_tab_id: Option<TabId>,
}

impl Default for DockState {
    fn default() -> Self {
        Self {
            height: DEFAULT_DOCK_HEIGHT,
            is_open: false,
            tabs: Vec::new(),
            selected_tab_id: None,
        }
    }
}

/// The dock: an ordered set of tabs with one selected.
pub struct DockStore {
    state: RwLock<DockState>,
    storage: Option<StorageHelper<DockState>>,
    tab_stores: RwLock<Vec<Arc<dyn TabDataStore>>>,
    revision: watch::Sender<u64>,
}

impl Default for DockStore {
    fn default() -> Self {
        Self::build(DockState::default(), None)
    }
}

impl DockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dock restored from `backend` under `key` and saved back after every change.
    pub fn persistent(key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        let storage = StorageHelper::new(key, backend);
        let mut state: DockState = storage.get();
        state.height = state.height.max(MIN_DOCK_HEIGHT);
        if state
            .selected_tab_id
            .as_ref()
            .is_some_and(|id| !state.tabs.iter().any(|tab| &tab.id == id))
        {
            state.selected_tab_id = state.tabs.first().map(|tab| tab.id.clone());
        }
        Self::build(state, Some(storage))
    }

    fn build(state: DockState, storage: Option<StorageHelper<DockState>>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(state),
            storage,
            tab_stores: RwLock::new(Vec::new()),
            revision,
        }
    }

    /// Registers state to be cleared whenever a tab closes.
    pub fn register_tab_store(&self, store: Arc<dyn TabDataStore>) {
        self.tab_stores.write().push(store);
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn tabs(&self) -> Vec<DockTab> {
        self.state.read().tabs.clone()
    }

    pub fn tab(&self, tab_id: &str) -> Option<DockTab> {
        self.state
            .read()
            .tabs
            .iter()
            .find(|tab| tab.id == tab_id)
            .cloned()
    }

    pub fn selected_tab(&self) -> Option<DockTab> {
        let state = self.state.read();
        let selected = state.selected_tab_id.as_ref()?;
        state.tabs.iter().find(|tab| &tab.id == selected).cloned()
    }

    pub fn is_open(&self) -> bool {
        self.state.read().is_open
    }

    pub fn height(&self) -> u32 {
        self.state.read().height
    }

    pub fn open(&self) {
        self.mutate(|state| state.is_open = true);
    }

    pub fn close(&self) {
        self.mutate(|state| state.is_open = false);
    }

    pub fn toggle(&self) {
        self.mutate(|state| state.is_open = !state.is_open);
    }

    pub fn set_height(&self, height: u32) {
        self.mutate(|state| state.height = height.max(MIN_DOCK_HEIGHT));
    }

    /// Adds a tab, selects it and opens the dock. Without a title the kind's name is used,
    /// numbered if it is taken.
    pub fn create_tab(&self, kind: TabKind, title: Option<String>) -> DockTab {
        let tab = self.mutate(|state| {
            let title = title.unwrap_or_else(|| unique_title(&state.tabs, kind.default_title()));
            let tab = DockTab {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                title,
            };
            state.tabs.push(tab.clone());
            state.selected_tab_id = Some(tab.id.clone());
            state.is_open = true;
            tab
        });
        log::debug!("created dock tab {} ({:?})", tab.id, tab.kind);
        tab
    }

    pub fn select_tab(&self, tab_id: &str) -> bool {
        self.mutate(|state| {
            let found = state.tabs.iter().any(|tab| tab.id == tab_id);
            if found {
                state.selected_tab_id = Some(tab_id.to_owned());
            }
            found
        })
    }

    pub fn rename_tab(&self, tab_id: &str, title: impl Into<String>) -> bool {
        let title = title.into();
        self.mutate(|state| match state.tabs.iter_mut().find(|tab| tab.id == tab_id) {
            Some(tab) => {
                tab.title = title;
                true
            }
            None => false,
        })
    }

    /// Closes a tab and drops its state from every registered tab store.
    pub fn close_tab(&self, tab_id: &str) -> bool {
        self.close_tabs(&[tab_id.to_owned()]) > 0
    }

    /// Closes tabs, returning how many existed.
    pub fn close_tabs(&self, tab_ids: &[TabId]) -> usize {
        let closed = self.mutate(|state| {
            let mut closed = Vec::new();
            for tab_id in tab_ids {
                let Some(index) = state.tabs.iter().position(|tab| &tab.id == tab_id) else {
                    continue;
                };
                state.tabs.remove(index);
                if state.selected_tab_id.as_ref() == Some(tab_id) {
                    let neighbour = index.saturating_sub(1).min(state.tabs.len().saturating_sub(1));
                    state.selected_tab_id = state.tabs.get(neighbour).map(|tab| tab.id.clone());
                }
                closed.push(tab_id.clone());
            }
            if state.tabs.is_empty() {
                state.is_open = false;
            }
            closed
        });

        let tab_stores = self.tab_stores.read();
        for tab_id in &closed {
            log::debug!("closed dock tab {tab_id}");
            for store in tab_stores.iter() {
                store.clear_data(tab_id);
            }
        }
        closed.len()
    }

    pub fn close_all_tabs(&self) -> usize {
        let ids: Vec<TabId> = self.tabs().into_iter().map(|tab| tab.id).collect();
        self.close_tabs(&ids)
    }

    pub fn close_other_tabs(&self, tab_id: &str) -> usize {
        let ids: Vec<TabId> = self
            .tabs()
            .into_iter()
            .map(|tab| tab.id)
            .filter(|id| id != tab_id)
            .collect();
        self.close_tabs(&ids)
    }

    pub fn close_tabs_to_the_right(&self, tab_id: &str) -> usize {
        let tabs = self.tabs();
        let Some(index) = tabs.iter().position(|tab| tab.id == tab_id) else {
            return 0;
        };
        let ids: Vec<TabId> = tabs[index + 1..].iter().map(|tab| tab.id.clone()).collect();
        self.close_tabs(&ids)
    }

    fn mutate<R>(&self, change: impl FnOnce(&mut DockState) -> R) -> R {
        let result = {
            let mut state = self.state.write();
            let result = change(&mut state);
            if let Some(storage) = &self.storage {
                storage.set(&state);
            }
            result
        };
        self.revision.send_modify(|revision| *revision += 1);
        result
    }
}

fn unique_title(tabs: &[DockTab], base: &str) -> String {
    let taken = |title: &str| tabs.iter().any(|tab| tab.title == title);
    if !taken(base) {
        return base.to_owned();
    }
    (1..)
        .map(|n| format!("{base} ({n})"))
        .find(|title| !taken(title))
        .unwrap_or_else(|| base.to_owned())
}
