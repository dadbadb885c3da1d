use crate::{ClusterContext, Config, NamespaceScope};

#[test]
fn empty_selection_means_every_namespace() {
    let mut context = ClusterContext::new(["a", "b", "c"]);
    assert!(context.has_selected_all());
    assert_eq!(context.context_namespaces().len(), 3);

    context.select_namespaces(["b"]);
    assert!(!context.has_selected_all());
    assert_eq!(context.load_scope(), NamespaceScope::selected(["b"]));
}

#[test]
fn cluster_wide_listing_collapses_the_scope() {
    let mut context = ClusterContext::new(["a", "b"]).with_cluster_wide_listing(true);
    assert_eq!(context.load_scope(), NamespaceScope::All);

    context.select_namespaces(["a"]);
    assert_eq!(context.load_scope(), NamespaceScope::selected(["a"]));

    let restricted = ClusterContext::new(["a", "b"]);
    assert_eq!(restricted.load_scope(), NamespaceScope::selected(["a", "b"]));
}

#[test]
fn vanished_namespaces_are_unselected() {
    let mut context = ClusterContext::new(["a", "b"]);
    context.select_namespaces(["a", "b"]);
    context.set_all_namespaces(["b", "c"]);

    assert_eq!(context.load_scope(), NamespaceScope::selected(["b"]));
}

#[test]
fn scope_keys() {
    assert_eq!(NamespaceScope::All.keys(true), [None::<String>]);
    assert_eq!(
        NamespaceScope::selected(["b", "a"]).keys(true),
        [Some("a".to_owned()), Some("b".to_owned())]
    );
    assert_eq!(NamespaceScope::selected(["a"]).keys(false), [None::<String>]);
}

#[test]
fn config_reads_camel_case_json() {
    let path = std::env::temp_dir().join(format!("{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "logLinesToLoad": 50, "watchTimeoutSecs": 30 }"#).unwrap();

    let config = Config::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.log_lines_to_load, 50);
    assert_eq!(config.watch_timeout_secs, Some(30));
    assert_eq!(config.storage_dir, None);
    assert_eq!(Config::default().log_lines_to_load, 500);
    assert_eq!(
        Config::default()
            .with_storage_dir("/tmp/dock")
            .storage_file("dock"),
        Some(std::path::PathBuf::from("/tmp/dock/dock.json"))
    );
}
