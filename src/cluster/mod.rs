//! Model of the storage cluster as glusterd reports it
//!
//! - Peer connectivity states and the readiness gate
//! - Volume, brick and topology types
//! - Bitrot, quota and split-brain settings
//! - The cluster CLI collaborator and its output parsers

pub mod cli;
pub mod features;
pub mod peer;
pub mod volume;

pub use cli::{ClusterCli, GlusterCli};
pub use features::{
    BitrotOption, Quota, ScrubAggression, ScrubControl, ScrubSchedule, SplitBrainPolicy,
};
pub use peer::{is_ready, wait_for_ready, Peer, ReadyPolicy, State};
pub use volume::{Brick, CreateVolume, Layout, Status, Toggle, Transport, Volume, VolumeType};
