//! Fault-injection verification protocol
//!
//! Each `FaultScenario` is one fixed experiment against a Ready cluster:
//! confirm the pre-fault state of a key, kill a process on the victim
//! member (the key's owner, its backup partner, or the elected
//! coordinator), optionally write and optionally inflict a second,
//! staggered fault, then assert the post-fault read. There is no retry
//! loop: a single assertion attempt follows the injected faults, under one
//! wall-clock budget for the whole scenario. A coordinator kill
//! additionally requires that a different member holds the coordinator
//! path once the election window has passed.
//!
//! The two terminal verdicts are deliberately distinct: `Error::Timeout`
//! means the system under test likely never recovered, `Error::Assertion`
//! means it recovered to a state the scenario did not expect.

use crate::cluster::locator::{parse_host, replica_partner, MemberMaps};
use crate::cluster::topology::ClusterTopology;
use crate::common::{Error, Result};
use crate::coordination::CoordinationClient;
use std::time::Duration;
use tracing::info;

/// Wall-clock budget matching the original harness default.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// Window granted to a coordinator election before the replacement locator
/// is checked.
pub const DEFAULT_ELECTION_WAIT: Duration = Duration::from_secs(3);

/// Which member takes the kill signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VictimRole {
    /// The member owning the target key's primary copy
    Owner,
    /// The owner's one-ahead ring backup partner
    OwnerBackup,
    /// The elected coordinator, resolved from the coordination tree
    Coordinator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGTERM, lets the process shut down cleanly
    Graceful,
    /// SIGKILL, no chance to flush anything
    Forced,
}

impl KillSignal {
    fn flag(&self) -> &'static str {
        match self {
            KillSignal::Graceful => "-SIGTERM",
            KillSignal::Forced => "-SIGKILL",
        }
    }
}

/// A second, staggered fault. The settle interval is a fixed minimum wait
/// before the second kill, bounding the window the cluster gets to finish
/// an in-flight replication pass. The storage collaborator exposes no
/// recovery-complete signal to poll, so a fixed sleep is all we have.
#[derive(Debug, Clone)]
pub struct SecondFault {
    pub victim: VictimRole,
    pub signal: KillSignal,
    pub settle: Duration,
}

/// Expected value and write version of the target key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    pub value: Vec<u8>,
    pub version: u64,
}

impl Expected {
    pub fn new(value: impl Into<Vec<u8>>, version: u64) -> Self {
        Self {
            value: value.into(),
            version,
        }
    }
}

/// One fault-injection experiment, constructed per test case.
#[derive(Debug, Clone)]
pub struct FaultScenario {
    pub table: u64,
    pub key: String,
    /// State the key must be in before any fault
    pub pre: Expected,
    pub victim: VictimRole,
    pub signal: KillSignal,
    /// Re-read and re-assert `pre` right after the first fault
    pub verify_between_faults: bool,
    /// Value written after the first fault, before any second one
    pub write_after_fault: Option<Vec<u8>>,
    pub second_fault: Option<SecondFault>,
    /// State the final read must observe
    pub post: Expected,
    /// Wait before checking for a replacement coordinator; only used when a
    /// fault targets the coordinator
    pub election_wait: Duration,
    pub max_wait: Duration,
}

impl FaultScenario {
    /// A single-fault scenario; callers adjust the optional pieces.
    pub fn new(
        table: u64,
        key: impl Into<String>,
        pre: Expected,
        victim: VictimRole,
        signal: KillSignal,
        post: Expected,
    ) -> Self {
        Self {
            table,
            key: key.into(),
            pre,
            victim,
            signal,
            verify_between_faults: false,
            write_after_fault: None,
            second_fault: None,
            post,
            election_wait: DEFAULT_ELECTION_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Runs scenarios against one Ready cluster.
pub struct FaultProtocol<'a> {
    topology: &'a ClusterTopology,
    maps: Option<&'a MemberMaps>,
    coordination: Option<(&'a dyn CoordinationClient, String)>,
}

impl<'a> FaultProtocol<'a> {
    pub fn new(topology: &'a ClusterTopology) -> Self {
        Self {
            topology,
            maps: None,
            coordination: None,
        }
    }

    /// Member maps are only needed for backup-victim scenarios; build them
    /// from a fresh coordination snapshot after the first table exists.
    pub fn with_member_maps(mut self, maps: &'a MemberMaps) -> Self {
        self.maps = Some(maps);
        self
    }

    /// Coordination access is only needed for coordinator-victim scenarios;
    /// `coordinator_path` holds the elected coordinator's locator.
    pub fn with_coordination(
        mut self,
        client: &'a dyn CoordinationClient,
        coordinator_path: impl Into<String>,
    ) -> Self {
        self.coordination = Some((client, coordinator_path.into()));
        self
    }

    /// Run one scenario to its verdict.
    pub async fn run(&self, scenario: &FaultScenario) -> Result<()> {
        match tokio::time::timeout(scenario.max_wait, self.run_inner(scenario)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(scenario.max_wait)),
        }
    }

    async fn run_inner(&self, scenario: &FaultScenario) -> Result<()> {
        let storage = self.topology.storage()?;

        // 1. Pre-fault state must hold, otherwise the scenario is void.
        let observed = storage.read(scenario.table, &scenario.key).await?;
        check(&scenario.key, &scenario.pre, &observed)?;

        // 2. Resolve the owner before any fault; a second fault targets
        // the ownership as it stood at the start of the scenario. The
        // coordinator locator is captured up front for the same reason.
        let locator = storage.locate_owner(scenario.table, &scenario.key).await?;
        let owner_host = parse_host(&locator)?;
        let involves_coordinator = scenario.victim == VictimRole::Coordinator
            || scenario
                .second_fault
                .as_ref()
                .is_some_and(|s| s.victim == VictimRole::Coordinator);
        let coordinator_pre = if involves_coordinator {
            Some(self.coordinator_locator().await?)
        } else {
            None
        };

        // 3.-4. Kill the first victim.
        let victim =
            self.resolve_victim(&owner_host, coordinator_pre.as_deref(), scenario.victim)?;
        self.inject(&victim, scenario.signal, scenario.victim).await?;

        if scenario.verify_between_faults {
            let observed = storage.read(scenario.table, &scenario.key).await?;
            check(&scenario.key, &scenario.pre, &observed)?;
        }

        if let Some(value) = &scenario.write_after_fault {
            storage.write(scenario.table, &scenario.key, value).await?;
        }

        // 5. Staggered second fault after the settle interval.
        if let Some(second) = &scenario.second_fault {
            tokio::time::sleep(second.settle).await;
            let victim =
                self.resolve_victim(&owner_host, coordinator_pre.as_deref(), second.victim)?;
            self.inject(&victim, second.signal, second.victim).await?;
        }

        // 6. The verdict read.
        let observed = storage.read(scenario.table, &scenario.key).await?;
        check(&scenario.key, &scenario.post, &observed)?;

        // A killed coordinator must be replaced: once the election window
        // has passed, a different locator must hold the coordinator path.
        if let Some(pre) = &coordinator_pre {
            tokio::time::sleep(scenario.election_wait).await;
            let post = self.coordinator_locator().await?;
            if post == *pre {
                return Err(Error::assertion(
                    "a newly elected coordinator locator",
                    format!("unchanged locator {}", post),
                ));
            }
            info!(locator = %post, "New coordinator elected");
        }
        Ok(())
    }

    async fn coordinator_locator(&self) -> Result<String> {
        let (client, path) = self.coordination.as_ref().ok_or_else(|| {
            Error::InvalidConfig(
                "coordinator-victim scenarios require a coordination client".to_string(),
            )
        })?;
        let data = client.get(path).await?.ok_or_else(|| {
            Error::Coordination(format!("no elected coordinator at {}", path))
        })?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn resolve_victim(
        &self,
        owner_host: &str,
        coordinator_locator: Option<&str>,
        role: VictimRole,
    ) -> Result<String> {
        match role {
            VictimRole::Owner => Ok(owner_host.to_string()),
            VictimRole::Coordinator => {
                let locator = coordinator_locator.ok_or_else(|| {
                    Error::InvalidConfig(
                        "coordinator-victim scenarios require a coordination client".to_string(),
                    )
                })?;
                parse_host(locator)
            }
            VictimRole::OwnerBackup => {
                // The ring heuristic silently targets the wrong host on any
                // other placement policy, so it is a checked precondition.
                if !self.topology.config().plus_one_backup {
                    return Err(Error::InvalidConfig(
                        "backup-victim scenarios require one-ahead ring placement \
                         (plus_one_backup)"
                            .to_string(),
                    ));
                }
                let maps = self.maps.ok_or_else(|| {
                    Error::InvalidConfig(
                        "backup-victim scenarios require member maps".to_string(),
                    )
                })?;
                let owner_id = maps.id_of(owner_host).ok_or_else(|| {
                    Error::Coordination(format!(
                        "owner host {} is not a registered member",
                        owner_host
                    ))
                })?;
                let partner = replica_partner(owner_id, maps.len() as u64);
                maps.host_of(partner).map(str::to_string).ok_or_else(|| {
                    Error::Coordination(format!("no registered host for partner id {}", partner))
                })
            }
        }
    }

    async fn inject(&self, host: &str, signal: KillSignal, role: VictimRole) -> Result<()> {
        let member = self
            .topology
            .member_by_host(host)
            .ok_or_else(|| Error::Other(format!("no cluster member at host {}", host)))?;
        let config = self.topology.config();
        let process = match role {
            VictimRole::Coordinator => config.coordinator_process.clone(),
            _ => config.storage_process.clone(),
        };
        info!(victim = %member.hostname, signal = ?signal, process = %process,
              "Injecting kill signal");
        let out = self
            .topology
            .runtime()
            .exec(&member.container, &["killall", signal.flag(), &process])
            .await?;
        if !out.success() {
            return Err(Error::Runtime(format!(
                "killall {} in {} failed (exit {}): {}",
                process,
                member.hostname,
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(())
    }
}

fn check(key: &str, expected: &Expected, observed: &(Vec<u8>, u64)) -> Result<()> {
    if observed.0 != expected.value || observed.1 != expected.version {
        return Err(Error::assertion(
            format!(
                "{} = ({}, v{})",
                key,
                String::from_utf8_lossy(&expected.value),
                expected.version
            ),
            format!(
                "({}, v{})",
                String::from_utf8_lossy(&observed.0),
                observed.1
            ),
        ));
    }
    Ok(())
}
