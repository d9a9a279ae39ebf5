//! Storage client seam
//!
//! The storage engine under test is a black box. The harness drives it
//! through this narrow client surface: connect, table management, versioned
//! read/write, and the locate-owner query the fault protocol uses to pick
//! its victim.

pub mod exec;

use crate::common::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use exec::ExecConnector;

/// Versioned value as returned by a read.
pub type Versioned = (Vec<u8>, u64);

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn create_table(&self, name: &str) -> Result<()>;

    async fn table_id(&self, name: &str) -> Result<u64>;

    async fn drop_table(&self, name: &str) -> Result<()>;

    /// Read a key, returning its value and write version. The first write
    /// of a key has version 1 and each subsequent write increments it.
    async fn read(&self, table: u64, key: &str) -> Result<Versioned>;

    /// Write a key, returning the new version.
    async fn write(&self, table: u64, key: &str, value: &[u8]) -> Result<u64>;

    /// Service locator of the member currently owning the key's primary
    /// copy.
    async fn locate_owner(&self, table: u64, key: &str) -> Result<String>;
}

/// Builds a connected storage client from the external-storage string
/// computed at provisioning time.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(
        &self,
        external_storage: &str,
        cluster_name: &str,
    ) -> Result<Arc<dyn StorageClient>>;
}

/// Drop every named table, stopping at the first failure.
pub async fn drop_all_tables(client: &dyn StorageClient, names: &[String]) -> Result<()> {
    for name in names {
        tracing::info!(table = %name, "Dropping table");
        client.drop_table(name).await?;
    }
    Ok(())
}
