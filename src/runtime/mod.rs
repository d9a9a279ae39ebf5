//! Container runtime capability surface
//!
//! The harness only needs a narrow slice of a container runtime: build or
//! find an image, create one bridge network with a fixed IPAM pool, launch
//! named containers at pinned addresses, exec into them, pull their logs,
//! and remove everything again. Everything behind this trait is an external
//! collaborator; the default implementation drives the `docker` CLI.

pub mod docker;

use crate::common::Result;
use crate::cluster::plan::NetworkPlan;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

pub use docker::DockerCli;

/// How to obtain the node image.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    /// Image name/tag; an existing image with this name is reused
    pub name: String,
    /// Dockerfile for the fallback build
    pub dockerfile: Option<PathBuf>,
    /// Build context for the fallback build
    pub build_context: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Everything needed to launch one cluster member.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Container name and hostname (they are kept identical)
    pub hostname: String,
    /// Pinned address on the cluster network
    pub ip: Ipv4Addr,
    /// Environment contract for the node entrypoint
    pub env: BTreeMap<String, String>,
    pub image: ImageHandle,
    pub network: NetworkHandle,
}

/// Captured output of an exec inside a container.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Reuse an existing image with the spec's name, building it only if
    /// no such image exists.
    async fn ensure_image(&self, spec: &ImageSpec) -> Result<ImageHandle>;

    /// Create the cluster network. Fails if a network with that name
    /// already exists; callers clean up stale networks explicitly first.
    async fn create_network(&self, name: &str, plan: &NetworkPlan) -> Result<NetworkHandle>;

    /// Look up a network by name. Absence is not an error.
    async fn find_network(&self, name: &str) -> Result<Option<NetworkHandle>>;

    async fn remove_network(&self, network: &NetworkHandle) -> Result<()>;

    /// Create and start a container. A container that was created but
    /// failed to start must be removed before the error propagates, so a
    /// partial launch never leaks a half-built container.
    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerHandle>;

    async fn exec(&self, container: &ContainerHandle, command: &[&str]) -> Result<ExecOutput>;

    /// Write the container's captured log output to `path`.
    async fn stream_logs_to_file(&self, container: &ContainerHandle, path: &Path) -> Result<()>;

    async fn remove_container(&self, container: &ContainerHandle, force: bool) -> Result<()>;

    /// All containers (running or not) whose name starts with `<prefix>-`.
    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<ContainerHandle>>;
}
