//! Harness configuration
//!
//! All naming and addressing used by the harness lives here and is passed
//! explicitly into every component. There is no ambient global state: two
//! harness instances with different configs can coexist in one process
//! (though they must not share docker names).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default port a coordination-service member listens on for clients.
pub const DEFAULT_COORDINATION_PORT: u16 = 2181;

/// Default CIDR for the cluster network. Link-local so it never collides
/// with anything routable on the host.
pub const DEFAULT_CIDR: &str = "169.254.3.0/24";

/// Global harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Logical cluster name, part of the storage connection handshake
    pub cluster_name: String,

    /// CIDR of the dedicated docker network
    pub cidr: String,

    /// Name of the node image (built on demand if missing)
    pub image_name: String,

    /// Dockerfile used when the image must be built
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<PathBuf>,

    /// Build context for the node image
    pub build_context: PathBuf,

    /// Name of the docker bridge network
    pub network_name: String,

    /// Container/hostname prefix; members are named `<prefix>-<id>`
    pub node_prefix: String,

    /// Process name of the storage server inside a node container,
    /// the target of injected kill signals
    pub storage_process: String,

    /// Process name of the elected coordinator inside a node container
    #[serde(default = "default_coordinator_process")]
    pub coordinator_process: String,

    /// Client port of the coordination service
    #[serde(default = "default_coordination_port")]
    pub coordination_port: u16,

    /// Whether the cluster is deployed with the one-ahead ring backup
    /// placement. Backup-victim fault scenarios require this to be true.
    #[serde(default = "default_plus_one_backup")]
    pub plus_one_backup: bool,
}

fn default_coordination_port() -> u16 {
    DEFAULT_COORDINATION_PORT
}

fn default_plus_one_backup() -> bool {
    true
}

fn default_coordinator_process() -> String {
    "storage-coordinator".to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cluster_name: "main".to_string(),
            cidr: DEFAULT_CIDR.to_string(),
            image_name: "storage-test".to_string(),
            dockerfile: Some(PathBuf::from("config/Dockerfile.node")),
            build_context: PathBuf::from("."),
            network_name: "storage-net".to_string(),
            node_prefix: "storage-node".to_string(),
            storage_process: "storage-server".to_string(),
            coordinator_process: "storage-coordinator".to_string(),
            coordination_port: DEFAULT_COORDINATION_PORT,
            plus_one_backup: true,
        }
    }
}

impl HarnessConfig {
    /// Apply a `IMAGE,NETWORK,NODE-PREFIX` triple from the CLI.
    pub fn set_docker_names(&mut self, names: &str) -> crate::Result<()> {
        let parts: Vec<&str> = names.split(',').collect();
        if parts.len() < 3 {
            return Err(crate::Error::InvalidConfig(format!(
                "three docker names required (image,network,node-prefix), provided: {}",
                names
            )));
        }
        self.image_name = parts[0].to_string();
        self.network_name = parts[1].to_string();
        self.node_prefix = parts[2].to_string();
        Ok(())
    }

    /// Hostname of the member with the given coordination id.
    pub fn member_hostname(&self, id: u32) -> String {
        format!("{}-{}", self.node_prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_names_triple() {
        let mut config = HarnessConfig::default();
        config
            .set_docker_names("my-image,my-net,my-node")
            .unwrap();
        assert_eq!(config.image_name, "my-image");
        assert_eq!(config.network_name, "my-net");
        assert_eq!(config.node_prefix, "my-node");
        assert_eq!(config.member_hostname(2), "my-node-2");
    }

    #[test]
    fn test_docker_names_too_few() {
        let mut config = HarnessConfig::default();
        let err = config.set_docker_names("image,net").unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
    }
}
