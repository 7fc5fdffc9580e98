//! Brick placement across peers
//!
//! Devices are paired with peers round robin, in the order the peers were
//! discovered. The input is an ordered slice rather than a map so that which
//! peers get dropped and how devices pair up is decided by the caller, not by
//! hash iteration order.

use crate::cluster::peer::Peer;
use crate::cluster::volume::{Brick, Volume};
use crate::common::config::DEFAULT_REPLICATION;
use crate::common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One peer as reported by discovery, with its usable brick paths in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub peer_id: String,
    pub address: String,
    #[serde(default)]
    pub bricks: Vec<String>,
}

impl PeerEntry {
    pub fn new(peer_id: impl Into<String>, address: impl Into<String>, bricks: &[&str]) -> Self {
        Self {
            peer_id: peer_id.into(),
            address: address.into(),
            bricks: bricks.iter().map(|b| b.to_string()).collect(),
        }
    }
}

/// Peer discovery collaborator.
pub trait PeerInfoSource {
    fn peers(&self) -> Result<Vec<PeerEntry>>;
}

impl PeerInfoSource for Vec<PeerEntry> {
    fn peers(&self) -> Result<Vec<PeerEntry>> {
        Ok(self.clone())
    }
}

/// Reads a JSON array of peer entries. Array order is the placement order.
///
/// ```json
/// [
///   {"peer_id": "glusterfs-0", "address": "192.168.10.1", "bricks": ["/mnt/vdb1", "/mnt/vdb2"]},
///   {"peer_id": "glusterfs-1", "address": "192.168.10.2", "bricks": ["/mnt/vdb1"]}
/// ]
/// ```
pub struct JsonPeerSource {
    path: PathBuf,
}

impl JsonPeerSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PeerInfoSource for JsonPeerSource {
    fn peers(&self) -> Result<Vec<PeerEntry>> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// A device that was available but left out of the placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedDevice {
    pub peer_id: String,
    pub address: String,
    pub path: String,
}

/// Result of a placement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Bricks in the order they must be handed to the cluster CLI
    pub bricks: Vec<Brick>,
    /// Surplus devices on peers that had more than the smallest peer
    pub discarded: Vec<DiscardedDevice>,
    /// Peers beyond the last full replica set, left for a later attempt
    pub dropped_peers: Vec<String>,
}

/// Outcome of candidate selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Bricks(Placement),
    /// Not an error: the normal state while a cluster is scaling up.
    WaitForMorePeers { needed: usize, available: usize },
}

/// Pair devices with peers round robin.
///
/// Each round takes the first remaining device of every peer. Rounds continue
/// only while every peer still has a device, so with `D_i` devices on peer `i`
/// exactly `peers.len() * min(D_i)` bricks come out. The rest is reported in
/// [`Placement::discarded`].
pub fn product_assign(peers: &[PeerEntry]) -> Placement {
    let rounds = peers.iter().map(|p| p.bricks.len()).min().unwrap_or(0);
    let mut placement = Placement::default();

    for round in 0..rounds {
        for entry in peers {
            placement.bricks.push(Brick::new(
                Peer::with_address(entry.address.clone()),
                entry.bricks[round].clone(),
            ));
        }
    }

    for entry in peers {
        for path in &entry.bricks[rounds..] {
            placement.discarded.push(DiscardedDevice {
                peer_id: entry.peer_id.clone(),
                address: entry.address.clone(),
                path: path.clone(),
            });
        }
    }

    if !placement.discarded.is_empty() {
        tracing::warn!(
            "{} devices left unused: peers expose unequal device counts",
            placement.discarded.len()
        );
    }
    placement
}

/// Peers not already serving a brick in `volume`.
///
/// Membership is by address string equality against each brick's peer
/// hostname, not by UUID.
pub fn find_new_peers(peers: &[PeerEntry], volume: &Volume) -> Vec<PeerEntry> {
    peers
        .iter()
        .filter(|entry| !volume.has_peer_address(&entry.address))
        .cloned()
        .collect()
}

/// Choose which peers take part and place their devices.
///
/// Without a volume every peer is a candidate; with one only the peers from
/// [`find_new_peers`] are. Fewer candidates than `replicas` means wait. Any
/// candidates beyond the last multiple of `replicas` are dropped from the
/// tail, keeping the given order. A `replicas` of zero is treated as the
/// default of 3.
pub fn select_peers(peers: &[PeerEntry], replicas: usize, volume: Option<&Volume>) -> Plan {
    let replicas = if replicas == 0 {
        DEFAULT_REPLICATION
    } else {
        replicas
    };

    let candidates = match volume {
        None => {
            tracing::debug!("Volume is none");
            peers.to_vec()
        }
        Some(volume) => {
            tracing::debug!(
                "Existing volume {}. Building differential brick list",
                volume.name
            );
            find_new_peers(peers, volume)
        }
    };

    let available = candidates.len();
    if available < replicas {
        tracing::info!(
            "Not enough peers to satisfy the replication level ({} < {}). Waiting for more peers to join.",
            available,
            replicas
        );
        return Plan::WaitForMorePeers {
            needed: replicas,
            available,
        };
    }

    let usable = available - (available % replicas);
    let mut placement = product_assign(&candidates[..usable]);
    placement.dropped_peers = candidates[usable..]
        .iter()
        .map(|entry| entry.peer_id.clone())
        .collect();
    if placement.dropped_peers.is_empty() {
        tracing::info!("Number of peers and number of replicas match");
    } else {
        tracing::info!(
            "Too many new peers. Dropping {} peers off the list",
            placement.dropped_peers.len()
        );
    }
    Plan::Bricks(placement)
}
