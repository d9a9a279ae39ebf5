//! Service locator parsing and member maps
//!
//! A locator is a comma-separated `key=value` list; the routable host
//! hides behind the transport-qualified `basic+udp:host` key. Member maps
//! pair coordination-registered server ids with those hosts, in both
//! directions. Registration is coordination-service-owned ground truth, so
//! the maps are always rebuilt from a fresh snapshot rather than patched.

use crate::common::{Error, Result};
use crate::coordination::snapshot::read_server_list;
use crate::coordination::CoordinationClient;
use std::collections::BTreeMap;

/// Locator key holding the routable host.
pub const LOCATOR_HOST_KEY: &str = "basic+udp:host";

/// Extract the routable host from a service locator string.
pub fn parse_host(locator: &str) -> Result<String> {
    locator
        .split(',')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| *key == LOCATOR_HOST_KEY)
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| Error::MalformedLocator(locator.to_string()))
}

/// The one-ahead ring backup placement: member `n` backs up onto member 1.
///
/// Only valid when the cluster actually runs with ring placement; callers
/// check `HarnessConfig::plus_one_backup` before relying on it.
pub fn replica_partner(owner_id: u64, ensemble_size: u64) -> u64 {
    if owner_id >= ensemble_size {
        1
    } else {
        owner_id + 1
    }
}

/// Bidirectional server-id ↔ host map.
///
/// Both directions are exact inverses; duplicate ids or hosts are rejected
/// at construction so the invariant cannot drift.
#[derive(Debug, Clone, Default)]
pub struct MemberMaps {
    id_to_host: BTreeMap<u64, String>,
    host_to_id: BTreeMap<String, u64>,
}

impl MemberMaps {
    pub fn from_entries(entries: impl IntoIterator<Item = (u64, String)>) -> Result<Self> {
        let mut maps = MemberMaps::default();
        for (id, host) in entries {
            if maps.id_to_host.contains_key(&id) {
                return Err(Error::Coordination(format!(
                    "duplicate server id in member registration: {}",
                    id
                )));
            }
            if maps.host_to_id.contains_key(&host) {
                return Err(Error::Coordination(format!(
                    "duplicate host in member registration: {}",
                    host
                )));
            }
            maps.id_to_host.insert(id, host.clone());
            maps.host_to_id.insert(host, id);
        }
        Ok(maps)
    }

    /// Build the maps from the registered-members path in the coordination
    /// tree.
    pub async fn from_snapshot(
        client: &dyn CoordinationClient,
        servers_path: &str,
    ) -> Result<Self> {
        let entries = read_server_list(client, servers_path).await?;
        let pairs: Result<Vec<(u64, String)>> = entries
            .iter()
            .map(|e| Ok((e.server_id, parse_host(&e.service_locator)?)))
            .collect();
        Self::from_entries(pairs?)
    }

    pub fn host_of(&self, id: u64) -> Option<&str> {
        self.id_to_host.get(&id).map(String::as_str)
    }

    pub fn id_of(&self, host: &str) -> Option<u64> {
        self.host_to_id.get(host).copied()
    }

    pub fn len(&self) -> usize {
        self.id_to_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_host.is_empty()
    }
}
