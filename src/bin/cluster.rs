//! Cluster management CLI
//!
//! Drives the harness against the local docker daemon: bring a cluster up
//! or down, report what is currently provisioned, collect logs and
//! coordination dumps, or reset a cluster back to an empty state.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use faultline::cluster::plan;
use faultline::common::DEFAULT_CIDR;
use faultline::coordination::{self, CoordinationClient, ExecClient};
use faultline::runtime::{ContainerRuntime, DockerCli};
use faultline::storage::{drop_all_tables, ExecConnector, StorageConnector};
use faultline::{ClusterTopology, HarnessConfig, NetworkPlan};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "faultline")]
#[command(about = "Ephemeral storage test clusters with fault injection")]
#[command(version)]
struct Cli {
    /// Action to take
    #[arg(long, short, value_enum, default_value = "status")]
    action: Action,

    /// Number of cluster members when bringing a cluster up (minimum 3)
    #[arg(long, short, default_value_t = 3)]
    nodes: u32,

    /// Directory for collected logs and coordination dumps
    #[arg(long, short, default_value = "./tmp")]
    path: PathBuf,

    /// CIDR of the dedicated cluster network
    #[arg(long, default_value = DEFAULT_CIDR)]
    cidr: String,

    /// Naming override as IMAGE,NETWORK,NODE-PREFIX
    #[arg(long)]
    docker_names: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Action {
    /// Report provisioned containers and network
    Status,
    /// Bring up a cluster, or drop all tables of a running one
    Reset,
    /// Bring up a new cluster
    Start,
    /// Remove all cluster containers and the network
    Stop,
    /// Collect container logs and a coordination dump
    Log,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // All input validation happens before the runtime is touched.
    NetworkPlan::parse(&cli.cidr).context("invalid --cidr")?;
    let mut config = HarnessConfig {
        cidr: cli.cidr.clone(),
        ..HarnessConfig::default()
    };
    if let Some(names) = &cli.docker_names {
        config
            .set_docker_names(names)
            .context("invalid --docker-names")?;
    }

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new());
    let connector = Arc::new(ExecConnector::new(
        Arc::clone(&runtime),
        config.node_prefix.clone(),
    ));
    let mut topology = ClusterTopology::new(config.clone(), Arc::clone(&runtime), connector);

    match cli.action {
        Action::Status => {
            topology.status().await?;
        }

        Action::Start => {
            topology.set_up(cli.nodes).await?;
        }

        Action::Stop => {
            topology.destroy().await?;
        }

        Action::Log => {
            let status = topology.status().await?;
            if status.network.is_none() || status.containers.is_empty() {
                info!("No network or containers currently up to log");
                return Ok(());
            }
            tokio::fs::create_dir_all(&cli.path).await?;
            for container in &status.containers {
                let out = cli.path.join(format!("{}.out", container.name));
                runtime.stream_logs_to_file(container, &out).await?;
            }
            let client = coordination_client(&runtime, &status.containers);
            let specs = coordination::default_snapshot_specs(&config.cluster_name);
            coordination::snapshot::dump_all(&client, &specs, &cli.path).await?;
            info!(path = %cli.path.display(), "Wrote logs and coordination dump");
        }

        Action::Reset => {
            let status = topology.status().await?;
            if status.network.is_none() {
                info!(nodes = cli.nodes, "Bringing up new cluster");
                topology.set_up(cli.nodes).await?;
            } else if status.containers.is_empty() {
                // A network without containers carries no data; replace it.
                info!("Inconsistent state, rebuilding cluster");
                topology.destroy().await?;
                let connector = Arc::new(ExecConnector::new(
                    Arc::clone(&runtime),
                    config.node_prefix.clone(),
                ));
                let mut fresh =
                    ClusterTopology::new(config.clone(), Arc::clone(&runtime), connector);
                fresh.set_up(cli.nodes).await?;
            } else {
                info!(nodes = status.containers.len(), "Found a cluster, dropping all tables");
                drop_tables(&runtime, &config, &status.containers).await?;
            }
        }
    }

    Ok(())
}

/// Coordination client through the lowest-named running container.
fn coordination_client(
    runtime: &Arc<dyn ContainerRuntime>,
    containers: &[faultline::runtime::ContainerHandle],
) -> ExecClient {
    let mut sorted: Vec<_> = containers.to_vec();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    ExecClient::new(
        Arc::clone(runtime),
        sorted[0].clone(),
        "localhost:2181",
    )
}

/// Enumerate tables through the coordination tree and drop every one.
async fn drop_tables(
    runtime: &Arc<dyn ContainerRuntime>,
    config: &HarnessConfig,
    containers: &[faultline::runtime::ContainerHandle],
) -> anyhow::Result<()> {
    let coordination = coordination_client(runtime, containers);
    let tables_path = coordination::snapshot::tables_path(&config.cluster_name);
    let names = coordination.children(&tables_path).await?;
    if names.is_empty() {
        info!("No tables to drop");
        return Ok(());
    }
    info!(tables = ?names, "Identified tables");

    // The ensemble is a pure function of node count and cidr, so it can be
    // rebuilt for a cluster this process did not provision.
    let (_, ensemble) = plan::plan(containers.len() as u32, &config.cidr)?;
    let external = plan::external_storage_uri(&ensemble, config.coordination_port);
    let connector = ExecConnector::new(Arc::clone(runtime), config.node_prefix.clone());
    let storage = connector.connect(&external, &config.cluster_name).await?;
    drop_all_tables(storage.as_ref(), &names).await?;
    Ok(())
}
