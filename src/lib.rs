//! # faultline
//!
//! Ephemeral Docker test clusters for a distributed storage engine, with
//! process-level fault injection and consistency verification:
//! - Deterministic network identity for N cluster members
//! - Provisioning and teardown through the local container runtime
//! - Coordination-tree snapshots for member maps and post-mortem dumps
//! - A fixed kill-and-verify protocol per fault scenario
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   plan    ┌─────────────────────────────┐
//! │ AddressPlan  ├──────────►│ ClusterTopology             │
//! └──────────────┘           │  network + N node containers│
//!                            │  + connected storage client │
//! ┌──────────────┐  id↔host  └──────────────┬──────────────┘
//! │ MemberMaps   │◄── coordination snapshot │ exec kill
//! └──────┬───────┘                          │
//!        │          ┌───────────────────────▼──┐
//!        └─────────►│ FaultProtocol            │
//!                   │  read / kill / write /   │
//!                   │  read, one verdict       │
//!                   └──────────────────────────┘
//! ```
//!
//! The storage engine, the coordination service and the container runtime
//! are external collaborators behind narrow traits; the harness owns only
//! topology, targeting and verification.
//!
//! ## Usage
//!
//! ```bash
//! # Bring up a 4-node cluster
//! faultline --action start --nodes 4
//!
//! # Inspect / collect logs / tear down
//! faultline --action status
//! faultline --action log --path ./tmp
//! faultline --action stop
//! ```

pub mod cluster;
pub mod common;
pub mod coordination;
pub mod fault;
pub mod runtime;
pub mod storage;

// Re-export commonly used types
pub use cluster::{ClusterState, ClusterTopology, MemberMaps, NetworkPlan};
pub use common::{Error, HarnessConfig, Result};
pub use fault::{FaultProtocol, FaultScenario};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
