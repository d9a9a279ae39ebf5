//! Exec-based storage client
//!
//! The node image bundles the storage engine's own command-line client.
//! This adapter runs it inside a cluster container, so the harness needs no
//! native bindings. Expected client surface:
//!
//! ```text
//! storage-cli --external <conn> --cluster <name> create-table <table>
//! storage-cli ... table-id <table>              -> <id>
//! storage-cli ... read <table-id> <key>         -> <version>\t<value>
//! storage-cli ... write <table-id> <key> <val>  -> <version>
//! storage-cli ... locate <table-id> <key>       -> <locator>
//! storage-cli ... drop-table <table>
//! ```
//!
//! The answer is always the last non-empty stdout line.

use super::{StorageClient, StorageConnector, Versioned};
use crate::common::{Error, Result};
use crate::runtime::{ContainerHandle, ContainerRuntime};
use async_trait::async_trait;
use std::sync::Arc;

/// Name of the bundled command-line client inside the node image.
pub const DEFAULT_CLI: &str = "storage-cli";

/// Connects `ExecStorageClient`s through a cluster container.
///
/// The container is resolved at connect time (the lowest-id member of the
/// named cluster), because the connector is built before any member exists.
pub struct ExecConnector {
    runtime: Arc<dyn ContainerRuntime>,
    node_prefix: String,
    cli: String,
}

impl ExecConnector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, node_prefix: impl Into<String>) -> Self {
        Self {
            runtime,
            node_prefix: node_prefix.into(),
            cli: DEFAULT_CLI.to_string(),
        }
    }

    pub fn with_cli(mut self, cli: impl Into<String>) -> Self {
        self.cli = cli.into();
        self
    }
}

#[async_trait]
impl StorageConnector for ExecConnector {
    async fn connect(
        &self,
        external_storage: &str,
        cluster_name: &str,
    ) -> Result<Arc<dyn StorageClient>> {
        let mut containers = self.runtime.list_by_name_prefix(&self.node_prefix).await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        let container = containers.into_iter().next().ok_or_else(|| {
            Error::Storage(format!(
                "no {}-* container available to exec the client in",
                self.node_prefix
            ))
        })?;
        Ok(Arc::new(ExecStorageClient {
            runtime: Arc::clone(&self.runtime),
            container,
            cli: self.cli.clone(),
            external_storage: external_storage.to_string(),
            cluster_name: cluster_name.to_string(),
        }))
    }
}

/// Storage client that shells into a cluster container per operation.
pub struct ExecStorageClient {
    runtime: Arc<dyn ContainerRuntime>,
    container: ContainerHandle,
    cli: String,
    external_storage: String,
    cluster_name: String,
}

impl ExecStorageClient {
    async fn run_cli(&self, op_args: &[&str]) -> Result<String> {
        let mut command = vec![
            self.cli.as_str(),
            "--external",
            &self.external_storage,
            "--cluster",
            &self.cluster_name,
        ];
        command.extend_from_slice(op_args);

        let out = self.runtime.exec(&self.container, &command).await?;
        if !out.success() {
            return Err(Error::Storage(format!(
                "{} {} failed (exit {}): {}",
                self.cli,
                op_args.join(" "),
                out.exit_code,
                out.stderr.trim()
            )));
        }
        out.stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Storage(format!("{} {}: empty response", self.cli, op_args.join(" ")))
            })
    }

    fn parse_version(&self, answer: &str) -> Result<u64> {
        answer
            .parse()
            .map_err(|_| Error::Storage(format!("unparseable version: {}", answer)))
    }
}

#[async_trait]
impl StorageClient for ExecStorageClient {
    async fn create_table(&self, name: &str) -> Result<()> {
        self.run_cli(&["create-table", name]).await?;
        Ok(())
    }

    async fn table_id(&self, name: &str) -> Result<u64> {
        let answer = self.run_cli(&["table-id", name]).await?;
        answer
            .parse()
            .map_err(|_| Error::Storage(format!("unparseable table id: {}", answer)))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        self.run_cli(&["drop-table", name]).await?;
        Ok(())
    }

    async fn read(&self, table: u64, key: &str) -> Result<Versioned> {
        let table = table.to_string();
        let answer = self.run_cli(&["read", &table, key]).await?;
        let (version, value) = answer.split_once('\t').ok_or_else(|| {
            Error::Storage(format!("unparseable read response: {}", answer))
        })?;
        Ok((value.as_bytes().to_vec(), self.parse_version(version)?))
    }

    async fn write(&self, table: u64, key: &str, value: &[u8]) -> Result<u64> {
        let table = table.to_string();
        let value = String::from_utf8_lossy(value).into_owned();
        let answer = self.run_cli(&["write", &table, key, &value]).await?;
        self.parse_version(&answer)
    }

    async fn locate_owner(&self, table: u64, key: &str) -> Result<String> {
        let table = table.to_string();
        self.run_cli(&["locate", &table, key]).await
    }
}
