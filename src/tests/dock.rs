use std::collections::HashMap;
use std::sync::Arc;

use super::{log_target, FakeLogSource};
use crate::dock::{
    JsonFileBackend, MemoryBackend, StorageBackend, StorageHelper, TabKind, MIN_DOCK_HEIGHT,
};
use crate::logs::LogTabData;
use crate::{Config, DockStore, DockTabStore, LogStore};

#[test]
fn new_tabs_are_selected_with_unique_titles() {
    let dock = DockStore::new();
    assert!(!dock.is_open());

    let first = dock.create_tab(TabKind::Terminal, None);
    let second = dock.create_tab(TabKind::Terminal, None);
    let named = dock.create_tab(TabKind::EditResource, Some("Pod: web".to_owned()));

    assert_eq!(first.title, "Terminal");
    assert_eq!(second.title, "Terminal (1)");
    assert_eq!(named.title, "Pod: web");
    assert_ne!(first.id, second.id);
    assert_eq!(dock.selected_tab(), Some(named));
    assert!(dock.is_open());

    assert!(dock.select_tab(&first.id));
    assert!(!dock.select_tab("missing"));
    assert!(dock.rename_tab(&first.id, "Shell"));
    assert_eq!(dock.selected_tab().map(|tab| tab.title), Some("Shell".to_owned()));
}

#[test]
fn closing_a_tab_clears_its_data() {
    let dock = DockStore::new();
    let drafts: Arc<DockTabStore<String>> = Arc::new(DockTabStore::new());
    dock.register_tab_store(Arc::clone(&drafts) as _);

    let kept = dock.create_tab(TabKind::EditResource, None);
    let closed = dock.create_tab(TabKind::EditResource, None);
    drafts.set_data(kept.id.clone(), "kind: Pod".to_owned());
    drafts.set_data(closed.id.clone(), "kind: Service".to_owned());

    assert!(dock.close_tab(&closed.id));

    assert!(!drafts.has_data(&closed.id));
    assert_eq!(drafts.get_data(&kept.id).as_deref(), Some("kind: Pod"));
    assert_eq!(dock.selected_tab(), Some(kept.clone()));
    assert!(!dock.close_tab(&closed.id));

    dock.close_tab(&kept.id);
    assert!(dock.tabs().is_empty());
    assert!(!dock.is_open());
    assert!(drafts.tab_ids().is_empty());
}

#[tokio::test]
async fn closing_a_log_tab_drops_its_lines() {
    let dock = DockStore::new();
    let logs = Arc::new(LogStore::new(
        FakeLogSource::new(&["2024-01-01T00:00:00Z started"]),
        &Config::default(),
    ));
    dock.register_tab_store(Arc::clone(&logs) as _);

    let tab = dock.create_tab(TabKind::PodLogs, None);
    logs.load(&tab.id, &log_target()).await.unwrap();
    assert_eq!(logs.logs(&tab.id, true).len(), 1);

    dock.close_tab(&tab.id);

    assert!(logs.logs(&tab.id, true).is_empty());
}

#[test]
fn bulk_close_operations() {
    let dock = DockStore::new();
    let ids: Vec<String> = (0..4)
        .map(|_| dock.create_tab(TabKind::Terminal, None).id)
        .collect();

    assert_eq!(dock.close_tabs_to_the_right(&ids[1]), 2);
    assert_eq!(dock.tabs().len(), 2);
    assert_eq!(dock.selected_tab().map(|tab| tab.id), Some(ids[1].clone()));

    assert_eq!(dock.close_other_tabs(&ids[0]), 1);
    assert_eq!(dock.selected_tab().map(|tab| tab.id), Some(ids[0].clone()));

    assert_eq!(dock.close_all_tabs(), 1);
    assert!(dock.selected_tab().is_none());
    assert_eq!(dock.close_tabs_to_the_right("missing"), 0);
}

#[test]
fn dock_height_has_a_minimum() {
    let dock = DockStore::new();
    dock.set_height(10);
    assert_eq!(dock.height(), MIN_DOCK_HEIGHT);
    dock.set_height(420);
    assert_eq!(dock.height(), 420);

    dock.toggle();
    assert!(dock.is_open());
    dock.close();
    assert!(!dock.is_open());
    dock.open();
    assert!(dock.is_open());
}

#[test]
fn dock_state_round_trips_through_storage() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::default());

    let (tabs, selected) = {
        let dock = DockStore::persistent("dock", Arc::clone(&backend));
        dock.create_tab(TabKind::Terminal, None);
        let logs = dock.create_tab(TabKind::PodLogs, None);
        dock.create_tab(TabKind::InstallChart, None);
        dock.select_tab(&logs.id);
        dock.set_height(250);
        (dock.tabs(), logs)
    };

    let restored = DockStore::persistent("dock", backend);
    assert_eq!(restored.tabs(), tabs);
    assert_eq!(restored.selected_tab(), Some(selected));
    assert_eq!(restored.height(), 250);
    assert!(restored.is_open());
}

#[test]
fn tab_data_round_trips_through_storage() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::default());
    let storage = || StorageHelper::<HashMap<String, LogTabData>>::new("pod_logs", Arc::clone(&backend));

    let store = DockTabStore::persistent(storage());
    assert!(store.is_persistent());
    store.set_data("tab-1", LogTabData::new("default", "web", Some("nginx".to_owned())));
    assert!(store.update_data("tab-1", |data| data.show_timestamps = true));
    assert!(!store.update_data("tab-2", |data| data.show_timestamps = true));

    let restored = DockTabStore::persistent(storage());
    let data = restored.get_data("tab-1").unwrap();
    assert!(data.show_timestamps);
    assert_eq!(data.target().container.as_deref(), Some("nginx"));

    restored.reset();
    assert!(DockTabStore::persistent(storage()).tab_ids().is_empty());
}

#[test]
fn storage_helper_merges_and_survives_bad_data() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::default());
    let helper = StorageHelper::<HashMap<String, u32>>::new("counters", Arc::clone(&backend));

    helper.set(&HashMap::from([("a".to_owned(), 1)]));
    helper.merge(serde_json::json!({ "b": 2 }));
    assert_eq!(helper.get(), HashMap::from([("a".to_owned(), 1), ("b".to_owned(), 2)]));

    backend.write("counters", serde_json::json!("not a map"));
    assert!(helper.get().is_empty());

    helper.reset();
    assert!(backend.read("counters").is_none());
}

#[test]
fn json_file_backend_persists_across_opens() {
    let path = std::env::temp_dir()
        .join(uuid::Uuid::new_v4().to_string())
        .join("dock.json");

    {
        let backend = JsonFileBackend::open(&path).unwrap();
        assert!(backend.read("dock").is_none());
        backend.write("dock", serde_json::json!({ "height": 200 }));
        backend.write("other", serde_json::json!(1));
        backend.remove("other");
    }

    let reopened = JsonFileBackend::open(&path).unwrap();
    assert_eq!(reopened.read("dock"), Some(serde_json::json!({ "height": 200 })));
    assert!(reopened.read("other").is_none());

    if let Some(dir) = reopened.path().parent() {
        std::fs::remove_dir_all(dir).unwrap();
    }
}

#[test]
fn config_selects_dock_storage() {
    let dir = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
    let config = Config::default().with_storage_dir(&dir);

    let tab = {
        let dock = DockStore::persistent("dock", config.storage_backend("dock").unwrap());
        dock.create_tab(TabKind::Terminal, None)
    };

    assert!(config.storage_file("dock").unwrap().exists());
    let restored = DockStore::persistent("dock", config.storage_backend("dock").unwrap());
    assert_eq!(restored.tabs(), [tab]);
    std::fs::remove_dir_all(&dir).unwrap();

    let in_memory = Config::default().storage_backend("dock").unwrap();
    assert!(in_memory.read("dock").is_none());
}
