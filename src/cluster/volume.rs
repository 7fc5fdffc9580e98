//! Volume and brick model
//!
//! A [`Volume`] is a read-only snapshot of what glusterd reports. It is
//! fetched fresh for every decision and never cached.

use crate::cluster::peer::Peer;
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Outcome of a volume lifecycle decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Created,
    WaitForMorePeers,
    InvalidConfig,
    FailedToCreate,
    FailedToStart,
    Expanded,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Created => "created",
            Status::WaitForMorePeers => "waiting for more peers",
            Status::InvalidConfig => "invalid config",
            Status::FailedToCreate => "failed to create",
            Status::FailedToStart => "failed to start",
            Status::Expanded => "expanded",
        };
        f.write_str(s)
    }
}

/// A replication unit: a filesystem path served by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brick {
    pub uuid: Option<Uuid>,
    pub peer: Peer,
    pub path: String,
    pub is_arbiter: bool,
}

impl Brick {
    pub fn new(peer: Peer, path: impl Into<String>) -> Self {
        Self {
            uuid: None,
            peer,
            path: path.into(),
            is_arbiter: false,
        }
    }
}

/// Renders as `host:path`, the form the gluster CLI expects.
impl fmt::Display for Brick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.peer.hostname, self.path)
    }
}

/// Transport glusterd uses for the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Transport {
    #[default]
    Tcp,
    TcpAndRdma,
    Rdma,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Tcp => "tcp",
            Transport::TcpAndRdma => "tcp,rdma",
            Transport::Rdma => "rdma",
        })
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "0" => Ok(Transport::Tcp),
            "tcp,rdma" => Ok(Transport::TcpAndRdma),
            "rdma" => Ok(Transport::Rdma),
            other => Err(Error::Parse(format!("unknown transport: {}", other))),
        }
    }
}

/// Every topology glusterd supports apart from tiering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeType {
    Arbiter,
    Distribute,
    Stripe,
    Replicate,
    StripedAndReplicate,
    Disperse,
    DistributedAndStripe,
    DistributedAndReplicate,
    DistributedAndStripedAndReplicate,
    DistributedAndDisperse,
}

impl VolumeType {
    /// Map the two generic config knobs onto this type's counts.
    ///
    /// | type | `replicas` | `extra` |
    /// |---|---|---|
    /// | Replicate, Distributed-Replicate | replica | - |
    /// | Arbiter | replica | arbiter |
    /// | Striped-Replicate, Distributed-Striped-Replicate | replica | stripe |
    /// | Disperse | disperse | redundancy |
    /// | Distributed-Disperse | - | disperse |
    /// | Stripe, Distributed-Stripe | stripe | - |
    /// | Distribute | - | - |
    pub fn layout(&self, replicas: usize, extra: usize) -> Layout {
        match self {
            VolumeType::Distribute => Layout::Distribute,
            VolumeType::Stripe | VolumeType::DistributedAndStripe => {
                Layout::Stripe { stripe: replicas }
            }
            VolumeType::Replicate | VolumeType::DistributedAndReplicate => {
                Layout::Replicate { replica: replicas }
            }
            VolumeType::Arbiter => Layout::Arbiter {
                replica: replicas,
                arbiter: extra,
            },
            VolumeType::StripedAndReplicate | VolumeType::DistributedAndStripedAndReplicate => {
                Layout::StripedReplicate {
                    stripe: extra,
                    replica: replicas,
                }
            }
            VolumeType::Disperse => Layout::Disperse {
                disperse: replicas,
                redundancy: Some(extra),
            },
            VolumeType::DistributedAndDisperse => Layout::Disperse {
                disperse: extra,
                redundancy: None,
            },
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolumeType::Arbiter => "arbiter",
            VolumeType::Distribute => "distribute",
            VolumeType::Stripe => "stripe",
            VolumeType::Replicate => "replicate",
            VolumeType::StripedAndReplicate => "striped-replicate",
            VolumeType::Disperse => "disperse",
            VolumeType::DistributedAndStripe => "distributed-stripe",
            VolumeType::DistributedAndReplicate => "distributed-replicate",
            VolumeType::DistributedAndStripedAndReplicate => "distributed-striped-replicate",
            VolumeType::DistributedAndDisperse => "distributed-disperse",
        })
    }
}

impl FromStr for VolumeType {
    type Err = Error;

    /// Accepts both config spellings (`distributed-replicate`) and the ones
    /// `gluster volume info` prints (`Distributed-Replicate`).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arbiter" => Ok(VolumeType::Arbiter),
            "distribute" => Ok(VolumeType::Distribute),
            "stripe" => Ok(VolumeType::Stripe),
            "replicate" => Ok(VolumeType::Replicate),
            "striped-replicate" | "stripd-replicate" => Ok(VolumeType::StripedAndReplicate),
            "disperse" => Ok(VolumeType::Disperse),
            "distributed-stripe" => Ok(VolumeType::DistributedAndStripe),
            "distributed-replicate" => Ok(VolumeType::DistributedAndReplicate),
            "distributed-striped-replicate" => Ok(VolumeType::DistributedAndStripedAndReplicate),
            "distributed-disperse" => Ok(VolumeType::DistributedAndDisperse),
            other => Err(Error::Parse(format!("unknown volume type: {}", other))),
        }
    }
}

/// Argument shape of a `volume create` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Distribute,
    Stripe { stripe: usize },
    Replicate { replica: usize },
    Arbiter { replica: usize, arbiter: usize },
    StripedReplicate { stripe: usize, replica: usize },
    Disperse { disperse: usize, redundancy: Option<usize> },
}

impl Layout {
    /// Count arguments in the order `volume create` accepts them.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, count: usize| {
            args.push(flag.to_string());
            args.push(count.to_string());
        };
        match *self {
            Layout::Distribute => {}
            Layout::Stripe { stripe } => push("stripe", stripe),
            Layout::Replicate { replica } => push("replica", replica),
            Layout::Arbiter { replica, arbiter } => {
                push("replica", replica);
                push("arbiter", arbiter);
            }
            Layout::StripedReplicate { stripe, replica } => {
                push("stripe", stripe);
                push("replica", replica);
            }
            Layout::Disperse {
                disperse,
                redundancy,
            } => {
                push("disperse", disperse);
                if let Some(redundancy) = redundancy {
                    push("redundancy", redundancy);
                }
            }
        }
        args
    }
}

/// A fully-specified `volume create` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVolume {
    pub name: String,
    pub layout: Layout,
    pub transport: Transport,
    pub bricks: Vec<Brick>,
    pub force: bool,
}

/// On/off value for boolean volume options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Toggle::On => "on",
            Toggle::Off => "off",
        })
    }
}

/// Snapshot of `gluster volume info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub vol_type: VolumeType,
    pub id: Option<Uuid>,
    pub status: String,
    pub snapshot_count: usize,
    pub dist_count: usize,
    pub stripe_count: usize,
    pub replica_count: usize,
    pub arbiter_count: usize,
    pub disperse_count: usize,
    pub redundancy_count: usize,
    pub transport: Transport,
    pub bricks: Vec<Brick>,
    pub options: BTreeMap<String, String>,
}

impl Volume {
    /// An empty volume of the given type, for building snapshots by hand.
    pub fn new(name: impl Into<String>, vol_type: VolumeType) -> Self {
        Self {
            name: name.into(),
            vol_type,
            id: None,
            status: String::new(),
            snapshot_count: 0,
            dist_count: 0,
            stripe_count: 0,
            replica_count: 0,
            arbiter_count: 0,
            disperse_count: 0,
            redundancy_count: 0,
            transport: Transport::Tcp,
            bricks: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    /// Does any brick of this volume live on `address`?
    pub fn has_peer_address(&self, address: &str) -> bool {
        self.bricks.iter().any(|brick| brick.peer.hostname == address)
    }

    /// Whether `features.quota` is switched on. Unset counts as off.
    pub fn quota_enabled(&self) -> Result<bool> {
        match self.options.get("features.quota").map(String::as_str) {
            None | Some("off") | Some("false") => Ok(false),
            Some("on") | Some("true") => Ok(true),
            Some(other) => Err(Error::Parse(format!(
                "unknown features.quota setting {} on volume {}",
                other, self.name
            ))),
        }
    }

    /// Bricks served from `address`.
    pub fn bricks_on(&self, address: &str) -> Vec<&Brick> {
        self.bricks
            .iter()
            .filter(|brick| brick.peer.hostname == address)
            .collect()
    }
}

/// The option set applied to every freshly started volume.
pub fn default_volume_options() -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    // 3.8 disables the built-in NFS server in favor of ganesha. Keep it running.
    options.insert("nfs.disable".to_string(), Toggle::Off.to_string());
    options.insert(
        "diagnostics.latency-measurement".to_string(),
        Toggle::On.to_string(),
    );
    options.insert("diagnostics.count-fop-hits".to_string(), Toggle::On.to_string());
    options.insert("diagnostics.fop-sample-interval".to_string(), "5".to_string());
    options.insert("diagnostics.stats-dump-interval".to_string(), "30".to_string());
    options.insert("diagnostics.stats-dnscache-ttl-sec".to_string(), "3600".to_string());
    options.insert("performance.parallel-readdir".to_string(), Toggle::On.to_string());
    options.insert("performance.readdir-ahead".to_string(), Toggle::On.to_string());
    options.insert(
        "performance.rda-cache-limit".to_string(),
        (20 * 1024 * 1024).to_string(),
    );
    options
}
