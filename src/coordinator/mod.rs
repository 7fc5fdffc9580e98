//! Topology planning and rollout coordination
//!
//! The coordinator is responsible for:
//! - Placement decisions (round robin bricks, replica-set truncation)
//! - Volume lifecycle (create, expand, shrink)
//! - Rollout markers (write-once timestamps on the cluster mount)
//! - Rolling upgrades, one peer at a time, without a leader

pub mod lifecycle;
pub mod markers;
pub mod placement;
pub mod rollout;

pub use lifecycle::{ShrinkOutcome, VolumeLifecycle};
pub use markers::{FileMarkerStore, MarkerKey, MarkerStore, MemMarkerStore, Phase};
pub use placement::{
    find_new_peers, product_assign, select_peers, DiscardedDevice, JsonPeerSource, PeerEntry,
    PeerInfoSource, Placement, Plan,
};
pub use rollout::{
    rollout_order, PredecessorOutcome, RolloutCoordinator, RolloutPolicy, RolloutReport,
    RolloutState, Upgrader,
};
