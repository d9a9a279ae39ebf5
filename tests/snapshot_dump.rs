//! Coordination snapshot and dump-format tests

mod support;

use faultline::cluster::MemberMaps;
use faultline::coordination::snapshot::{
    self, default_snapshot_specs, servers_path, PathSpec, PayloadKind, SchemaId, TableConfig,
};
use faultline::coordination::MemoryTree;
use support::registered_members_tree;

#[tokio::test]
async fn test_dump_of_missing_path_writes_nothing() {
    let tree = MemoryTree::new();
    let dir = tempfile::tempdir().unwrap();
    // the coordinator path only appears after an election; missing is fine
    let spec = PathSpec::new(
        "coordinator.out",
        "/storage/main/coordinator",
        PayloadKind::Text,
        true,
    );

    snapshot::dump(&tree, &spec, dir.path()).await.unwrap();
    assert!(!dir.path().join("coordinator.out").exists());
}

#[tokio::test]
async fn test_dump_text_leaf_format() {
    let tree = MemoryTree::new();
    tree.insert("/zookeeper/config", b"server.1=169.254.3.1:2888:3888".to_vec());
    let dir = tempfile::tempdir().unwrap();
    let spec = PathSpec::new("config.out", "/zookeeper/config", PayloadKind::Text, true);

    snapshot::dump(&tree, &spec, dir.path()).await.unwrap();
    let contents = std::fs::read_to_string(dir.path().join("config.out")).unwrap();
    assert_eq!(
        contents,
        "/zookeeper/config ==>\nserver.1=169.254.3.1:2888:3888\n\n"
    );
}

#[tokio::test]
async fn test_dump_structured_directory() {
    let tree = MemoryTree::new();
    for (id, name) in [(1u64, "test"), (2, "accounts")] {
        let config = TableConfig {
            table_id: id,
            name: name.to_string(),
            server_span: 1,
        };
        tree.insert(
            format!("/storage/main/tables/{}", name),
            bincode::serialize(&config).unwrap(),
        );
    }
    let dir = tempfile::tempdir().unwrap();
    let spec = PathSpec::new(
        "tables.out",
        "/storage/main/tables",
        PayloadKind::Structured(SchemaId::TableConfig),
        false,
    );

    snapshot::dump(&tree, &spec, dir.path()).await.unwrap();
    let contents = std::fs::read_to_string(dir.path().join("tables.out")).unwrap();
    // one header block per child, each ending with a blank line
    assert!(contents.contains("/storage/main/tables/test ==>\n"));
    assert!(contents.contains("/storage/main/tables/accounts ==>\n"));
    assert!(contents.contains("\"table_id\": 1"));
    assert!(contents.contains("\"name\": \"accounts\""));
    assert_eq!(contents.matches("==>\n").count(), 2);
    assert!(contents.ends_with("\n\n"));
}

#[tokio::test]
async fn test_dump_all_skips_missing_paths_and_keeps_going() {
    let tree = MemoryTree::new();
    tree.insert("/zookeeper/config", b"cfg".to_vec());
    let dir = tempfile::tempdir().unwrap();
    let specs = default_snapshot_specs("main");

    snapshot::dump_all(&tree, &specs, dir.path()).await.unwrap();
    assert!(dir.path().join("config.out").exists());
    // nothing under /storage/main exists yet, so none of those files do
    assert!(!dir.path().join("servers.out").exists());
    assert!(!dir.path().join("tableManager.out").exists());
}

#[tokio::test]
async fn test_undecodable_payload_falls_back_to_text() {
    let tree = MemoryTree::new();
    // not a valid TableManager record
    tree.insert("/storage/main/tableManager", b"garbage".to_vec());
    let dir = tempfile::tempdir().unwrap();
    let spec = PathSpec::new(
        "tableManager.out",
        "/storage/main/tableManager",
        PayloadKind::Structured(SchemaId::TableManager),
        true,
    );

    snapshot::dump(&tree, &spec, dir.path()).await.unwrap();
    let contents = std::fs::read_to_string(dir.path().join("tableManager.out")).unwrap();
    assert!(contents.contains("garbage"));
}

#[tokio::test]
async fn test_member_maps_from_registered_members() {
    let tree = registered_members_tree(4);
    let maps = MemberMaps::from_snapshot(&tree, &servers_path("main"))
        .await
        .unwrap();
    assert_eq!(maps.len(), 4);
    assert_eq!(maps.host_of(2), Some("169.254.3.2"));
    assert_eq!(maps.id_of("169.254.3.4"), Some(4));
}

#[tokio::test]
async fn test_member_maps_from_empty_tree_are_empty() {
    let tree = MemoryTree::new();
    let maps = MemberMaps::from_snapshot(&tree, &servers_path("main"))
        .await
        .unwrap();
    assert!(maps.is_empty());
}
