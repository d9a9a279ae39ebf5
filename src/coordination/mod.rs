//! Coordination service seam
//!
//! The coordination service is an external collaborator: a hierarchical
//! path tree with `get`, `exists` and `children`. The harness only ever
//! reads from it. `MemoryTree` is the offline implementation used by the
//! test suite; `ExecClient` reaches a live service through a cluster
//! container.

pub mod exec;
pub mod snapshot;

use crate::common::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub use exec::ExecClient;
pub use snapshot::{
    default_snapshot_specs, DecodedPayload, PathSpec, PayloadKind, SchemaId, ServerListEntry,
};

#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Payload at `path`, or `None` if the path does not exist.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Names (not full paths) of the immediate children of `path`.
    async fn children(&self, path: &str) -> Result<Vec<String>>;
}

/// In-memory coordination tree.
///
/// Paths are absolute, `/`-separated. A node exists if it holds a payload
/// or has descendants, matching how a real tree treats interior nodes.
#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.nodes
            .lock()
            .expect("coordination tree lock poisoned")
            .insert(path.into(), payload.into());
    }

    pub fn remove(&self, path: &str) {
        self.nodes
            .lock()
            .expect("coordination tree lock poisoned")
            .remove(path);
    }
}

#[async_trait]
impl CoordinationClient for MemoryTree {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let nodes = self.nodes.lock().expect("coordination tree lock poisoned");
        Ok(nodes.get(path).cloned())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let nodes = self.nodes.lock().expect("coordination tree lock poisoned");
        let dir_prefix = format!("{}/", path);
        Ok(nodes.contains_key(path) || nodes.keys().any(|k| k.starts_with(&dir_prefix)))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let nodes = self.nodes.lock().expect("coordination tree lock poisoned");
        let dir_prefix = format!("{}/", path);
        let mut names: Vec<String> = nodes
            .keys()
            .filter_map(|k| k.strip_prefix(&dir_prefix))
            .filter(|rest| !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect();
        names.dedup();
        Ok(names)
    }
}
