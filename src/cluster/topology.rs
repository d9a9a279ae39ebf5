//! Cluster topology and lifecycle
//!
//! `ClusterTopology` owns the provisioned member records and the shared
//! network. Lifecycle is a one-way state machine:
//!
//! ```text
//! Unprovisioned -> Provisioning -> Ready -> TornDown
//! ```
//!
//! `set_up` fails fast on the first launch error and leaves the members it
//! already started running: automatic rollback in a test harness would
//! mask the original failure signal, so cleanup is an explicit `tear_down`
//! (which is safe to call from any state).

use crate::cluster::plan::{self, Ensemble};
use crate::common::{Error, HarnessConfig, Result};
use crate::runtime::{ContainerHandle, ContainerRuntime, ImageSpec, LaunchSpec, NetworkHandle};
use crate::storage::{StorageClient, StorageConnector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Lifecycle state of a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Unprovisioned,
    Provisioning,
    Ready,
    TornDown,
}

/// What a cluster member runs. The default node image is a combined one:
/// every member hosts a coordination-service peer alongside its storage
/// role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberRole {
    StorageNode,
    Coordinator,
    CoordinationService,
}

/// One provisioned cluster member.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub hostname: String,
    pub ip: Ipv4Addr,
    /// Coordination-service member id, 1-based and contiguous
    pub coordination_id: u32,
    pub role: MemberRole,
    pub container: ContainerHandle,
}

/// Presence of harness resources as seen by the runtime, independent of
/// any live topology. Used to detect leftovers from a crashed run.
#[derive(Debug, Clone)]
pub struct ClusterStatus {
    pub network: Option<NetworkHandle>,
    pub containers: Vec<ContainerHandle>,
}

pub struct ClusterTopology {
    config: HarnessConfig,
    runtime: Arc<dyn ContainerRuntime>,
    connector: Arc<dyn StorageConnector>,
    state: ClusterState,
    network: Option<NetworkHandle>,
    members: Vec<MemberRecord>,
    ensemble: Ensemble,
    client: Option<Arc<dyn StorageClient>>,
}

impl ClusterTopology {
    pub fn new(
        config: HarnessConfig,
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn StorageConnector>,
    ) -> Self {
        Self {
            config,
            runtime,
            connector,
            state: ClusterState::Unprovisioned,
            network: None,
            members: Vec::new(),
            ensemble: Ensemble::new(),
            client: None,
        }
    }

    /// Provision a cluster of `node_count` members (at least 3).
    ///
    /// Cleans out stale containers/network from a previous run first, then
    /// creates the network, resolves the node image, launches members in
    /// ascending id order and connects the storage client.
    pub async fn set_up(&mut self, node_count: u32) -> Result<()> {
        if self.state != ClusterState::Unprovisioned {
            return Err(Error::provisioning(
                "cluster",
                format!(
                    "set_up called in {:?} state; a topology provisions exactly one cluster",
                    self.state
                ),
            ));
        }

        // Validate before touching the runtime: bad input must have no
        // side effects.
        let (network_plan, ensemble) = plan::plan(node_count, &self.config.cidr)?;

        self.clean_stale().await;
        self.state = ClusterState::Provisioning;

        let network = self
            .runtime
            .create_network(&self.config.network_name, &network_plan)
            .await?;
        self.network = Some(network.clone());

        let image = self.runtime.ensure_image(&self.image_spec()).await?;

        let peer_servers = plan::ensemble_servers_string(&ensemble);
        let external = plan::external_storage_uri(&ensemble, self.config.coordination_port);

        for (&id, &ip) in &ensemble {
            let hostname = self.config.member_hostname(id);
            let mut env = BTreeMap::new();
            env.insert("ZOO_MY_ID".to_string(), id.to_string());
            env.insert("ZOO_SERVERS".to_string(), peer_servers.clone());
            env.insert("STORAGE_EXTERNAL".to_string(), external.clone());
            env.insert(
                "STORAGE_CLUSTER".to_string(),
                self.config.cluster_name.clone(),
            );
            env.insert("STORAGE_IP".to_string(), ip.to_string());

            let spec = LaunchSpec {
                hostname: hostname.clone(),
                ip,
                env,
                image: image.clone(),
                network: network.clone(),
            };
            // Members launched before a failure stay tracked so tear_down
            // can remove them.
            let container = self.runtime.launch(&spec).await?;
            self.members.push(MemberRecord {
                hostname,
                ip,
                coordination_id: id,
                role: MemberRole::StorageNode,
                container,
            });
        }

        self.ensemble = ensemble;
        let client = self
            .connector
            .connect(&external, &self.config.cluster_name)
            .await?;
        self.client = Some(client);
        self.state = ClusterState::Ready;
        info!(nodes = node_count, "Cluster is ready");
        Ok(())
    }

    /// Remove every tracked container, then the network. Best effort:
    /// per-resource failures are logged and skipped, and calling this from
    /// any state (including after a failed `set_up`) is safe.
    pub async fn tear_down(&mut self) {
        for member in std::mem::take(&mut self.members) {
            info!(container = %member.hostname, "Removing container");
            if let Err(e) = self.runtime.remove_container(&member.container, true).await {
                warn!(container = %member.hostname, error = %e, "Failed to remove container");
            }
        }
        if let Some(network) = self.network.take() {
            info!(network = %network.name, "Removing network");
            if let Err(e) = self.runtime.remove_network(&network).await {
                warn!(network = %network.name, error = %e, "Failed to remove network");
            }
        }
        self.client = None;
        self.ensemble.clear();
        self.state = ClusterState::TornDown;
    }

    /// Query the runtime for harness resources by name. Stateless: works
    /// without (and regardless of) a provisioned cluster.
    pub async fn status(&self) -> Result<ClusterStatus> {
        let containers = self
            .runtime
            .list_by_name_prefix(&self.config.node_prefix)
            .await?;
        let network = self.runtime.find_network(&self.config.network_name).await?;
        if containers.is_empty() {
            info!("No cluster nodes found");
        } else {
            info!(count = containers.len(), "Found cluster nodes");
        }
        match &network {
            Some(n) => info!(network = %n.name, "Found cluster network"),
            None => info!("Cluster network not found"),
        }
        Ok(ClusterStatus {
            network,
            containers,
        })
    }

    /// Remove whatever harness resources the runtime reports, tracked or
    /// not. This is the recovery path for resources leaked by a crashed
    /// prior run.
    pub async fn destroy(&mut self) -> Result<()> {
        let status = self.status().await?;
        for container in status.containers {
            info!(container = %container.name, "Removing container");
            if let Err(e) = self.runtime.remove_container(&container, true).await {
                warn!(container = %container.name, error = %e, "Failed to remove container");
            }
        }
        if let Some(network) = status.network {
            info!(network = %network.name, "Removing network");
            if let Err(e) = self.runtime.remove_network(&network).await {
                warn!(network = %network.name, error = %e, "Failed to remove network");
            }
        }
        self.members.clear();
        self.network = None;
        self.client = None;
        self.ensemble.clear();
        self.state = ClusterState::TornDown;
        Ok(())
    }

    /// Connected storage client; only available on a Ready cluster.
    pub fn storage(&self) -> Result<Arc<dyn StorageClient>> {
        match (&self.state, &self.client) {
            (ClusterState::Ready, Some(client)) => Ok(Arc::clone(client)),
            _ => Err(Error::Other(format!(
                "no storage client: cluster is {:?}",
                self.state
            ))),
        }
    }

    /// Create the conventional `test` table and seed `testKey=testValue`
    /// (version 1). Returns the table id.
    pub async fn create_test_value(&self) -> Result<u64> {
        let client = self.storage()?;
        client.create_table("test").await?;
        let table = client.table_id("test").await?;
        client.write(table, "testKey", b"testValue").await?;
        Ok(table)
    }

    /// Write each member's captured logs to `<dir>/<hostname>.out`.
    pub async fn dump_logs(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        for member in &self.members {
            let out = dir.join(format!("{}.out", member.hostname));
            self.runtime
                .stream_logs_to_file(&member.container, &out)
                .await?;
        }
        Ok(())
    }

    /// Member whose address matches a locator host.
    pub fn member_by_host(&self, host: &str) -> Option<&MemberRecord> {
        self.members.iter().find(|m| m.ip.to_string() == host)
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn members(&self) -> &[MemberRecord] {
        &self.members
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// External-storage connection string of the live ensemble.
    pub fn external_storage_uri(&self) -> String {
        plan::external_storage_uri(&self.ensemble, self.config.coordination_port)
    }

    fn image_spec(&self) -> ImageSpec {
        ImageSpec {
            name: self.config.image_name.clone(),
            dockerfile: self.config.dockerfile.clone(),
            build_context: self.config.build_context.clone(),
        }
    }

    /// Best-effort removal of leftovers matching our naming scheme.
    /// Absence of a resource is the normal case, not an error.
    async fn clean_stale(&self) {
        match self
            .runtime
            .list_by_name_prefix(&self.config.node_prefix)
            .await
        {
            Ok(stale) => {
                for container in stale {
                    info!(container = %container.name, "Removing stale container");
                    if let Err(e) = self.runtime.remove_container(&container, true).await {
                        warn!(container = %container.name, error = %e,
                              "Failed to remove stale container");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not list stale containers"),
        }
        match self.runtime.find_network(&self.config.network_name).await {
            Ok(Some(network)) => {
                info!(network = %network.name, "Removing stale network");
                if let Err(e) = self.runtime.remove_network(&network).await {
                    warn!(network = %network.name, error = %e, "Failed to remove stale network");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not look up stale network"),
        }
    }
}
