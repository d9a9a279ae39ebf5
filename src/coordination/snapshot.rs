//! Coordination tree snapshots
//!
//! A `PathSpec` names one interesting path in the coordination tree, how
//! its payload decodes, and whether the path is a single leaf or a
//! directory whose children each hold one payload. Snapshots serve two
//! purposes: building member maps for fault targeting, and dumping the
//! tree to files for post-mortem inspection.
//!
//! Missing paths are expected, not errors. The coordinator-manager path,
//! for example, only appears once an election has completed.

use super::CoordinationClient;
use crate::common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Identifies the binary schema of a structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaId {
    ServerListEntry,
    ClusterClock,
    TableConfig,
    TableManager,
    CoordinatorUpdate,
}

/// How a payload decodes. Resolved once when the spec is built, never
/// re-inspected per read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Raw bytes rendered as UTF-8 text
    Text,
    Structured(SchemaId),
}

/// One named path in the coordination tree.
#[derive(Debug, Clone)]
pub struct PathSpec {
    /// File name used by `dump`
    pub output_name: String,
    /// Absolute tree path
    pub path: String,
    pub kind: PayloadKind,
    /// Leaf paths hold one payload; non-leaf paths are directories whose
    /// children each hold one
    pub is_leaf: bool,
}

impl PathSpec {
    pub fn new(
        output_name: impl Into<String>,
        path: impl Into<String>,
        kind: PayloadKind,
        is_leaf: bool,
    ) -> Self {
        Self {
            output_name: output_name.into(),
            path: path.into(),
            kind,
            is_leaf,
        }
    }
}

/// A registered storage-cluster member as published in the coordination
/// tree. The locator is the transport-qualified address clients use to
/// reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerListEntry {
    pub server_id: u64,
    pub service_locator: String,
}

/// Monotonic cluster-wide clock maintained by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterClock {
    pub safe_time_micros: u64,
}

/// Per-table configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub table_id: u64,
    pub name: String,
    pub server_span: u32,
}

/// Table-manager bookkeeping record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManager {
    pub next_table_id: u64,
}

/// Coordinator update-manager watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorUpdate {
    pub completed_update: u64,
}

/// A decoded payload ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    Text(String),
    Structured(serde_json::Value),
}

impl DecodedPayload {
    /// Human-readable text form, as written by `dump`.
    pub fn render(&self) -> String {
        match self {
            DecodedPayload::Text(s) => s.clone(),
            DecodedPayload::Structured(v) => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
        }
    }
}

fn decode_structured<T: DeserializeOwned + Serialize>(
    path: &str,
    data: &[u8],
) -> Result<DecodedPayload> {
    let record: T = bincode::deserialize(data).map_err(|e| Error::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let value = serde_json::to_value(record).map_err(|e| Error::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(DecodedPayload::Structured(value))
}

/// Decode one payload per the spec's kind.
pub fn decode(kind: PayloadKind, path: &str, data: &[u8]) -> Result<DecodedPayload> {
    match kind {
        PayloadKind::Text => Ok(DecodedPayload::Text(
            String::from_utf8_lossy(data).into_owned(),
        )),
        PayloadKind::Structured(schema) => match schema {
            SchemaId::ServerListEntry => decode_structured::<ServerListEntry>(path, data),
            SchemaId::ClusterClock => decode_structured::<ClusterClock>(path, data),
            SchemaId::TableConfig => decode_structured::<TableConfig>(path, data),
            SchemaId::TableManager => decode_structured::<TableManager>(path, data),
            SchemaId::CoordinatorUpdate => decode_structured::<CoordinatorUpdate>(path, data),
        },
    }
}

/// Resolve the concrete payload paths for a spec: the path itself for a
/// leaf, otherwise one path per child.
async fn resolve_paths(client: &dyn CoordinationClient, spec: &PathSpec) -> Result<Vec<String>> {
    if spec.is_leaf {
        return Ok(vec![spec.path.clone()]);
    }
    Ok(client
        .children(&spec.path)
        .await?
        .into_iter()
        .map(|child| format!("{}/{}", spec.path, child))
        .collect())
}

/// Read and decode every payload under a spec.
///
/// Returns `None` when the root path is absent, which is an expected state
/// for optional paths. A child that vanishes between enumeration and fetch
/// is skipped.
pub async fn read_all(
    client: &dyn CoordinationClient,
    spec: &PathSpec,
) -> Result<Option<Vec<(String, DecodedPayload)>>> {
    if !client.exists(&spec.path).await? {
        return Ok(None);
    }
    let mut payloads = Vec::new();
    for path in resolve_paths(client, spec).await? {
        if let Some(data) = client.get(&path).await? {
            payloads.push((path.clone(), decode(spec.kind, &path, &data)?));
        }
    }
    Ok(Some(payloads))
}

/// Read every registered member record under the servers path.
pub async fn read_server_list(
    client: &dyn CoordinationClient,
    servers_path: &str,
) -> Result<Vec<ServerListEntry>> {
    let spec = PathSpec::new(
        "servers.out",
        servers_path,
        PayloadKind::Structured(SchemaId::ServerListEntry),
        false,
    );
    let mut entries = Vec::new();
    if client.exists(servers_path).await? {
        for path in resolve_paths(client, &spec).await? {
            if let Some(data) = client.get(&path).await? {
                let entry: ServerListEntry =
                    bincode::deserialize(&data).map_err(|e| Error::Decode {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                entries.push(entry);
            }
        }
    }
    Ok(entries)
}

/// Dump a spec to `<out_dir>/<output_name>`.
///
/// Each resolved path contributes a `<path> ==>` header, its rendered
/// payload and a blank line. An absent root path writes no file. A payload
/// that fails to decode is written as lossy text so a dump taken from a
/// half-broken cluster still captures something.
pub async fn dump(
    client: &dyn CoordinationClient,
    spec: &PathSpec,
    out_dir: &Path,
) -> Result<()> {
    if !client.exists(&spec.path).await? {
        return Ok(());
    }
    tokio::fs::create_dir_all(out_dir).await?;

    let mut contents = String::new();
    for path in resolve_paths(client, spec).await? {
        let data = match client.get(&path).await? {
            Some(data) => data,
            None => continue,
        };
        let rendered = match decode(spec.kind, &path, &data) {
            Ok(payload) => payload.render(),
            Err(e) => {
                warn!(path = %path, error = %e, "Undecodable payload, dumping as text");
                String::from_utf8_lossy(&data).into_owned()
            }
        };
        contents.push_str(&format!("{} ==>\n{}\n\n", path, rendered));
    }

    tokio::fs::write(out_dir.join(&spec.output_name), contents).await?;
    Ok(())
}

/// Dump every spec in the set. Continues past per-spec failures so one bad
/// path does not cost the rest of the post-mortem.
pub async fn dump_all(
    client: &dyn CoordinationClient,
    specs: &[PathSpec],
    out_dir: &Path,
) -> Result<()> {
    for spec in specs {
        if let Err(e) = dump(client, spec, out_dir).await {
            warn!(path = %spec.path, error = %e, "Failed to dump coordination path");
        }
    }
    Ok(())
}

/// The fixed set of paths worth capturing from a running cluster.
pub fn default_snapshot_specs(cluster_name: &str) -> Vec<PathSpec> {
    let root = format!("/storage/{}", cluster_name);
    vec![
        PathSpec::new("config.out", "/zookeeper/config", PayloadKind::Text, true),
        PathSpec::new("quota.out", "/zookeeper/quota", PayloadKind::Text, true),
        PathSpec::new(
            "clusterClock.out",
            format!("{}/coordinatorClusterClock", root),
            PayloadKind::Structured(SchemaId::ClusterClock),
            true,
        ),
        PathSpec::new(
            "tables.out",
            format!("{}/tables", root),
            PayloadKind::Structured(SchemaId::TableConfig),
            false,
        ),
        PathSpec::new(
            "tableManager.out",
            format!("{}/tableManager", root),
            PayloadKind::Structured(SchemaId::TableManager),
            true,
        ),
        PathSpec::new(
            "coordinator.out",
            coordinator_path(cluster_name),
            PayloadKind::Text,
            true,
        ),
        PathSpec::new(
            "servers.out",
            format!("{}/servers", root),
            PayloadKind::Structured(SchemaId::ServerListEntry),
            false,
        ),
        PathSpec::new(
            "coordinatorUpdateManager.out",
            format!("{}/coordinatorUpdateManager", root),
            PayloadKind::Structured(SchemaId::CoordinatorUpdate),
            true,
        ),
        PathSpec::new(
            "clientLeaseAuthority.out",
            format!("{}/clientLeaseAuthority", root),
            PayloadKind::Text,
            false,
        ),
    ]
}

/// Servers path for a cluster, the ground truth for member maps.
pub fn servers_path(cluster_name: &str) -> String {
    format!("/storage/{}/servers", cluster_name)
}

/// Tables directory for a cluster.
pub fn tables_path(cluster_name: &str) -> String {
    format!("/storage/{}/tables", cluster_name)
}

/// Path holding the elected coordinator's service locator. Absent until an
/// election has completed.
pub fn coordinator_path(cluster_name: &str) -> String {
    format!("/storage/{}/coordinator", cluster_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryTree;

    #[tokio::test]
    async fn test_read_all_absent_root_is_none() {
        let tree = MemoryTree::new();
        let spec = PathSpec::new("x.out", "/storage/main/coordinator", PayloadKind::Text, true);
        assert_eq!(read_all(&tree, &spec).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_all_directory_of_structured_records() {
        let tree = MemoryTree::new();
        let entry = ServerListEntry {
            server_id: 7,
            service_locator: "basic+udp:host=169.254.3.2,port=11111".to_string(),
        };
        tree.insert(
            "/storage/main/servers/7",
            bincode::serialize(&entry).unwrap(),
        );

        let spec = PathSpec::new(
            "servers.out",
            "/storage/main/servers",
            PayloadKind::Structured(SchemaId::ServerListEntry),
            false,
        );
        let payloads = read_all(&tree, &spec).await.unwrap().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].0, "/storage/main/servers/7");
        match &payloads[0].1 {
            DecodedPayload::Structured(v) => {
                assert_eq!(v["server_id"], 7);
            }
            other => panic!("expected structured payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_server_list() {
        let tree = MemoryTree::new();
        for id in [1u64, 2, 3] {
            let entry = ServerListEntry {
                server_id: id,
                service_locator: format!("basic+udp:host=169.254.3.{},port=11111", id),
            };
            tree.insert(
                format!("/storage/main/servers/{}", id),
                bincode::serialize(&entry).unwrap(),
            );
        }
        let entries = read_server_list(&tree, "/storage/main/servers").await.unwrap();
        assert_eq!(entries.len(), 3);

        // absent path yields an empty list, not an error
        let none = read_server_list(&tree, "/storage/other/servers")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_decode_text_is_lossless_utf8() {
        let payload = decode(PayloadKind::Text, "/p", b"hello").unwrap();
        assert_eq!(payload.render(), "hello");
    }
}
