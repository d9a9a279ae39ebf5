//! Exec-based coordination client
//!
//! Reaches a live coordination service by running its bundled CLI
//! (`zkCli.sh`) inside one of the cluster containers, which avoids linking
//! a client library into the harness. The CLI prints payloads as text, so
//! this adapter is best effort: fine for text paths and tree structure,
//! lossy for binary payloads. The test suite uses `MemoryTree` instead.

use super::CoordinationClient;
use crate::common::{Error, Result};
use crate::runtime::{ContainerHandle, ContainerRuntime, ExecOutput};
use async_trait::async_trait;
use std::sync::Arc;

const NO_NODE_MARKER: &str = "Node does not exist";

/// Coordination client that shells into a cluster container.
pub struct ExecClient {
    runtime: Arc<dyn ContainerRuntime>,
    container: ContainerHandle,
    server: String,
}

impl ExecClient {
    /// `server` is the `<host>:<port>` the in-container CLI should talk to;
    /// `localhost:2181` works from any coordination-service member.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container: ContainerHandle,
        server: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            container,
            server: server.into(),
        }
    }

    async fn cli(&self, command: &str, path: &str) -> Result<ExecOutput> {
        let out = self
            .runtime
            .exec(
                &self.container,
                &["zkCli.sh", "-server", &self.server, command, path],
            )
            .await?;
        if !out.success() && !out.stdout.contains(NO_NODE_MARKER) {
            return Err(Error::Coordination(format!(
                "zkCli {} {} failed (exit {}): {}",
                command,
                path,
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(out)
    }

    /// The CLI interleaves connection logging with the actual answer; keep
    /// only lines that are not obviously log output.
    fn answer_lines(output: &ExecOutput) -> Vec<&str> {
        output
            .stdout
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .filter(|l| !l.contains("INFO") && !l.contains("WARN") && !l.contains("ERROR"))
            .filter(|l| !l.starts_with("WATCHER::") && !l.starts_with("Connecting to"))
            .filter(|l| !l.starts_with("WatchedEvent"))
            .collect()
    }
}

#[async_trait]
impl CoordinationClient for ExecClient {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let out = self.cli("get", path).await?;
        if out.stdout.contains(NO_NODE_MARKER) {
            return Ok(None);
        }
        let lines = Self::answer_lines(&out);
        Ok(Some(lines.join("\n").into_bytes()))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let out = self.cli("stat", path).await?;
        Ok(!out.stdout.contains(NO_NODE_MARKER))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let out = self.cli("ls", path).await?;
        if out.stdout.contains(NO_NODE_MARKER) {
            return Ok(Vec::new());
        }
        // The child list is printed as a bracketed, comma-separated row.
        let listing = Self::answer_lines(&out)
            .into_iter()
            .rev()
            .find(|l| l.starts_with('[') && l.ends_with(']'))
            .ok_or_else(|| {
                Error::Coordination(format!("unparseable child listing for {}", path))
            })?;
        let inner = &listing[1..listing.len() - 1];
        Ok(inner
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}
