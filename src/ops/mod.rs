//! Ops workflows for volume and upgrade management

pub mod actions;
pub mod upgrade;
pub mod volume;

pub use actions::{create_quota, delete_quota, list_quotas, parse_option_pairs};
pub use upgrade::{check_for_upgrade, AptUpgrader, UpgradeReport};
pub use volume::{ensure_volume, VolumeReport};
