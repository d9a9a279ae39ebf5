//! Cluster planning, provisioning and member lookup

pub mod locator;
pub mod plan;
pub mod topology;

pub use locator::{parse_host, replica_partner, MemberMaps, LOCATOR_HOST_KEY};
pub use plan::{plan, Ensemble, NetworkPlan};
pub use topology::{ClusterState, ClusterStatus, ClusterTopology, MemberRecord, MemberRole};
