//! Mock collaborators for harness tests
//!
//! `MockRuntime` records every runtime call instead of talking to docker;
//! `MockStorage` simulates a versioned key-value cluster that always
//! "recovers" from injected faults. Tests assert on what the harness did
//! (which container it killed, with which signal) and on the verdicts it
//! reports.

#![allow(dead_code)]

use async_trait::async_trait;
use faultline::cluster::plan::NetworkPlan;
use faultline::common::{Error, HarnessConfig, Result};
use faultline::coordination::{MemoryTree, ServerListEntry};
use faultline::runtime::{
    ContainerHandle, ContainerRuntime, ExecOutput, ImageHandle, ImageSpec, LaunchSpec,
    NetworkHandle,
};
use faultline::storage::{StorageClient, StorageConnector, Versioned};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RuntimeState {
    network: Option<NetworkHandle>,
    containers: Vec<ContainerHandle>,
    launched: Vec<LaunchSpec>,
    execs: Vec<(String, Vec<String>)>,
    removed_containers: Vec<String>,
    removed_networks: Vec<String>,
    fail_launch_of: Option<String>,
}

/// Container runtime double that records calls.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<RuntimeState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a leftover container, as if a prior run crashed mid-test.
    pub fn seed_container(&self, name: &str) {
        self.state.lock().unwrap().containers.push(ContainerHandle {
            id: format!("stale-{}", name),
            name: name.to_string(),
        });
    }

    /// Seed a leftover network.
    pub fn seed_network(&self, name: &str) {
        self.state.lock().unwrap().network = Some(NetworkHandle {
            id: format!("stale-{}", name),
            name: name.to_string(),
        });
    }

    /// Make the launch of `hostname` fail after the preceding ones worked.
    pub fn fail_launch_of(&self, hostname: &str) {
        self.state.lock().unwrap().fail_launch_of = Some(hostname.to_string());
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().launched.clone()
    }

    /// Recorded execs as (container name, command) pairs.
    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().execs.clone()
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_containers.clone()
    }

    pub fn removed_networks(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_networks.clone()
    }

    pub fn live_containers(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ensure_image(&self, spec: &ImageSpec) -> Result<ImageHandle> {
        Ok(ImageHandle {
            id: "img-test".to_string(),
            name: spec.name.clone(),
        })
    }

    async fn create_network(&self, name: &str, _plan: &NetworkPlan) -> Result<NetworkHandle> {
        let mut state = self.state.lock().unwrap();
        if state.network.is_some() {
            return Err(Error::provisioning(
                format!("network {}", name),
                "already exists",
            ));
        }
        let handle = NetworkHandle {
            id: format!("net-{}", name),
            name: name.to_string(),
        };
        state.network = Some(handle.clone());
        Ok(handle)
    }

    async fn find_network(&self, _name: &str) -> Result<Option<NetworkHandle>> {
        Ok(self.state.lock().unwrap().network.clone())
    }

    async fn remove_network(&self, network: &NetworkHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.network = None;
        state.removed_networks.push(network.name.clone());
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_launch_of.as_deref() == Some(spec.hostname.as_str()) {
            return Err(Error::provisioning(
                format!("container {}", spec.hostname),
                "simulated start failure",
            ));
        }
        let handle = ContainerHandle {
            id: format!("c-{}", spec.hostname),
            name: spec.hostname.clone(),
        };
        state.containers.push(handle.clone());
        state.launched.push(spec.clone());
        Ok(handle)
    }

    async fn exec(&self, container: &ContainerHandle, command: &[&str]) -> Result<ExecOutput> {
        self.state.lock().unwrap().execs.push((
            container.name.clone(),
            command.iter().map(|s| s.to_string()).collect(),
        ));
        Ok(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn stream_logs_to_file(&self, container: &ContainerHandle, path: &Path) -> Result<()> {
        tokio::fs::write(path, format!("log of {}\n", container.name)).await?;
        Ok(())
    }

    async fn remove_container(&self, container: &ContainerHandle, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.containers.retain(|c| c.id != container.id);
        state.removed_containers.push(container.name.clone());
        Ok(())
    }

    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<ContainerHandle>> {
        let wanted = format!("{}-", prefix);
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.name.starts_with(&wanted))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct StorageState {
    tables: BTreeMap<String, u64>,
    next_table: u64,
    values: BTreeMap<(u64, String), Versioned>,
    owners: BTreeMap<String, String>,
    connected_to: Option<(String, String)>,
}

/// Storage client double simulating a cluster that always recovers.
#[derive(Default)]
pub struct MockStorage {
    state: Mutex<StorageState>,
    read_delay: Mutex<Option<Duration>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare which host owns a key's primary copy.
    pub fn set_owner(&self, key: &str, host: &str) {
        self.state
            .lock()
            .unwrap()
            .owners
            .insert(key.to_string(), host.to_string());
    }

    /// Delay every read, to drive scenarios into their wall-clock budget.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn connected_to(&self) -> Option<(String, String)> {
        self.state.lock().unwrap().connected_to.clone()
    }
}

#[async_trait]
impl StorageClient for MockStorage {
    async fn create_table(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.tables.contains_key(name) {
            state.next_table += 1;
            let id = state.next_table;
            state.tables.insert(name.to_string(), id);
        }
        Ok(())
    }

    async fn table_id(&self, name: &str) -> Result<u64> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(name)
            .copied()
            .ok_or_else(|| Error::Storage(format!("no such table: {}", name)))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.tables.remove(name) {
            state.values.retain(|(table, _), _| *table != id);
        }
        Ok(())
    }

    async fn read(&self, table: u64, key: &str) -> Result<Versioned> {
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .unwrap()
            .values
            .get(&(table, key.to_string()))
            .cloned()
            .ok_or_else(|| Error::Storage(format!("no such key: {}", key)))
    }

    async fn write(&self, table: u64, key: &str, value: &[u8]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .values
            .entry((table, key.to_string()))
            .or_insert_with(|| (Vec::new(), 0));
        entry.0 = value.to_vec();
        entry.1 += 1;
        Ok(entry.1)
    }

    async fn locate_owner(&self, _table: u64, key: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        let host = state
            .owners
            .get(key)
            .ok_or_else(|| Error::Storage(format!("no owner configured for key: {}", key)))?;
        Ok(format!("basic+udp:host={},port=11111", host))
    }
}

/// Connector handing out one shared `MockStorage`.
pub struct MockConnector {
    pub storage: Arc<MockStorage>,
}

impl MockConnector {
    pub fn new(storage: Arc<MockStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl StorageConnector for MockConnector {
    async fn connect(
        &self,
        external_storage: &str,
        cluster_name: &str,
    ) -> Result<Arc<dyn StorageClient>> {
        self.storage.state.lock().unwrap().connected_to =
            Some((external_storage.to_string(), cluster_name.to_string()));
        Ok(Arc::clone(&self.storage) as Arc<dyn StorageClient>)
    }
}

/// Harness config used across the integration tests.
pub fn test_config() -> HarnessConfig {
    HarnessConfig {
        cluster_name: "main".to_string(),
        cidr: "169.254.3.0/24".to_string(),
        ..HarnessConfig::default()
    }
}

/// Coordination tree with one registered member record per ensemble entry,
/// ids and hosts matching the address plan.
pub fn registered_members_tree(node_count: u32) -> MemoryTree {
    let tree = MemoryTree::new();
    for id in 1..=node_count {
        let entry = ServerListEntry {
            server_id: id as u64,
            service_locator: format!("basic+udp:host=169.254.3.{},port=11111", id),
        };
        tree.insert(
            format!("/storage/main/servers/{}", id),
            bincode::serialize(&entry).unwrap(),
        );
    }
    tree
}
