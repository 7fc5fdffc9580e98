//! # brickwork
//!
//! Topology planner and rollout coordinator for a replicated storage
//! cluster (glusterd):
//! - Round robin brick placement over an ordered list of peers
//! - Replica-set truncation and differential expansion of existing volumes
//! - Volume create/expand/shrink through the gluster CLI
//! - Leaderless rolling upgrades sequenced by write-once markers
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!  PeerInfoSource ──► placement ──► lifecycle ──► ClusterCli (gluster)
//!                                       │
//!  ConfigSource ───► VolumeSettings ────┘
//!
//!  pool list ──► rollout ──► MarkerStore (cluster mount)
//!                   │
//!                   └──► Upgrader (apt)
//! ```
//!
//! Everything is synchronous. The only blocking points are the readiness
//! wait and the predecessor wait of a rollout, both driven by a
//! [`common::Clock`] so tests can simulate time.
//!
//! ## Usage
//!
//! ```bash
//! # Preview the placement
//! brickwork plan --peers ./peers.json
//!
//! # Create or expand the configured volume
//! brickwork --config ./brickwork.toml ensure --peers ./peers.json
//!
//! # Roll the cluster to the newest glusterfs, one peer at a time
//! brickwork upgrade
//! ```

pub mod cluster;
pub mod common;
pub mod coordinator;
pub mod ops;
pub mod storage;

// Re-export commonly used types
pub use cluster::{wait_for_ready, ClusterCli, GlusterCli, Peer, ReadyPolicy, State, Status};
pub use common::{Config, Error, Result};
pub use coordinator::{select_peers, PeerEntry, Placement, Plan, RolloutCoordinator, VolumeLifecycle};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
