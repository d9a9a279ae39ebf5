//! Docker CLI adapter
//!
//! Drives the `docker` binary through `tokio::process`. The harness never
//! needs streaming APIs or event subscriptions, so shelling out keeps the
//! adapter independent of daemon API versions.

use super::{
    ContainerHandle, ContainerRuntime, ExecOutput, ImageHandle, ImageSpec, LaunchSpec,
    NetworkHandle,
};
use crate::cluster::plan::NetworkPlan;
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Container runtime backed by the local `docker` CLI.
#[derive(Debug, Clone, Default)]
pub struct DockerCli;

impl DockerCli {
    pub fn new() -> Self {
        Self
    }

    /// Run a docker subcommand and capture its output.
    async fn run(&self, args: &[&str]) -> Result<ExecOutput> {
        debug!(command = %args.join(" "), "docker");
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Runtime(format!("failed to spawn docker: {}", e)))?;
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run a docker subcommand, failing on a non-zero exit code.
    async fn run_ok(&self, args: &[&str]) -> Result<ExecOutput> {
        let out = self.run(args).await?;
        if !out.success() {
            return Err(Error::Runtime(format!(
                "docker {} failed (exit {}): {}",
                args.first().copied().unwrap_or(""),
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(out)
    }

    async fn image_id(&self, name: &str) -> Result<Option<String>> {
        let out = self
            .run(&["image", "inspect", "--format", "{{.Id}}", name])
            .await?;
        if out.success() {
            Ok(Some(out.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ensure_image(&self, spec: &ImageSpec) -> Result<ImageHandle> {
        if let Some(id) = self.image_id(&spec.name).await? {
            info!(image = %spec.name, "Found existing image, using that");
            return Ok(ImageHandle {
                id,
                name: spec.name.clone(),
            });
        }

        info!(image = %spec.name, "Building image...");
        let context = spec.build_context.to_string_lossy().into_owned();
        let dockerfile;
        let mut args: Vec<&str> = vec!["build", "-t", &spec.name];
        if let Some(path) = &spec.dockerfile {
            dockerfile = path.to_string_lossy().into_owned();
            args.extend_from_slice(&["-f", &dockerfile]);
        }
        args.push(&context);
        self.run_ok(&args).await?;
        info!(image = %spec.name, "Building image...succeeded");

        let id = self
            .image_id(&spec.name)
            .await?
            .ok_or_else(|| Error::Runtime(format!("image {} missing after build", spec.name)))?;
        Ok(ImageHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn create_network(&self, name: &str, plan: &NetworkPlan) -> Result<NetworkHandle> {
        if self.find_network(name).await?.is_some() {
            return Err(Error::provisioning(
                format!("network {}", name),
                "a network with this name already exists; clean up first",
            ));
        }

        info!(network = %name, subnet = %plan.cidr, "Creating docker network...");
        let gateway;
        let mut args = vec!["network", "create", "--subnet", plan.cidr.as_str()];
        if let Some(gw) = &plan.gateway {
            gateway = gw.to_string();
            args.extend_from_slice(&["--gateway", &gateway]);
        }
        args.push(name);
        let out = self
            .run_ok(&args)
            .await
            .map_err(|e| Error::provisioning(format!("network {}", name), e))?;
        info!(network = %name, subnet = %plan.cidr, "Creating docker network...succeeded");

        Ok(NetworkHandle {
            id: out.stdout.trim().to_string(),
            name: name.to_string(),
        })
    }

    async fn find_network(&self, name: &str) -> Result<Option<NetworkHandle>> {
        let out = self
            .run(&["network", "inspect", "--format", "{{.Id}}", name])
            .await?;
        if out.success() {
            Ok(Some(NetworkHandle {
                id: out.stdout.trim().to_string(),
                name: name.to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    async fn remove_network(&self, network: &NetworkHandle) -> Result<()> {
        self.run_ok(&["network", "rm", &network.name]).await?;
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        info!(hostname = %spec.hostname, ip = %spec.ip, "Launching node container...");

        let ip = spec.ip.to_string();
        let env_pairs: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.hostname.clone(),
            "--hostname".to_string(),
            spec.hostname.clone(),
            "--network".to_string(),
            spec.network.name.clone(),
            "--ip".to_string(),
            ip,
        ];
        for pair in &env_pairs {
            args.push("-e".to_string());
            args.push(pair.clone());
        }
        args.push(spec.image.name.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .run_ok(&arg_refs)
            .await
            .map_err(|e| Error::provisioning(format!("container {}", spec.hostname), e))?;
        let id = out.stdout.trim().to_string();
        let handle = ContainerHandle {
            id: id.clone(),
            name: spec.hostname.clone(),
        };

        // A container can be created but fail to start. Remove the husk
        // before propagating so a failed launch leaves nothing behind.
        if let Err(start_err) = self.run_ok(&["start", &id]).await {
            warn!(hostname = %spec.hostname, error = %start_err,
                  "Error starting container, attempting to delete...");
            if let Err(rm_err) = self.remove_container(&handle, true).await {
                warn!(hostname = %spec.hostname, error = %rm_err,
                      "Failed to delete partially created container");
            }
            return Err(Error::provisioning(
                format!("container {}", spec.hostname),
                start_err,
            ));
        }

        info!(hostname = %spec.hostname, ip = %spec.ip, "Launching node container...successful");
        Ok(handle)
    }

    async fn exec(&self, container: &ContainerHandle, command: &[&str]) -> Result<ExecOutput> {
        let mut args = vec!["exec", container.id.as_str()];
        args.extend_from_slice(command);
        self.run(&args).await
    }

    async fn stream_logs_to_file(&self, container: &ContainerHandle, path: &Path) -> Result<()> {
        // `docker logs` interleaves stdout and stderr; keep both.
        let mut command = Command::new("docker");
        command.args(["logs", container.id.as_str()]);
        stream_to_file(command, "docker logs", path).await
    }

    async fn remove_container(&self, container: &ContainerHandle, force: bool) -> Result<()> {
        if force {
            self.run_ok(&["rm", "-f", &container.id]).await?;
        } else {
            self.run_ok(&["rm", &container.id]).await?;
        }
        Ok(())
    }

    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<ContainerHandle>> {
        let filter = format!("name={}-", prefix);
        let out = self
            .run_ok(&[
                "ps",
                "-a",
                "--filter",
                &filter,
                "--format",
                "{{.ID}}\t{{.Names}}",
            ])
            .await?;
        let mut handles = Vec::new();
        for line in out.stdout.lines() {
            if let Some((id, name)) = line.split_once('\t') {
                handles.push(ContainerHandle {
                    id: id.trim().to_string(),
                    name: name.trim().to_string(),
                });
            }
        }
        Ok(handles)
    }
}

/// Pipe a command's stdout and stderr straight into `path`. Container logs
/// can be large, so the output is never buffered in memory.
async fn stream_to_file(mut command: Command, label: &str, path: &Path) -> Result<()> {
    let file = tokio::fs::File::create(path).await?.into_std().await;
    let stderr = file.try_clone()?;
    let status = command
        .stdout(Stdio::from(file))
        .stderr(Stdio::from(stderr))
        .status()
        .await
        .map_err(|e| Error::Runtime(format!("failed to spawn {}: {}", label, e)))?;
    if !status.success() {
        return Err(Error::Runtime(format!(
            "{} failed (exit {})",
            label,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}
