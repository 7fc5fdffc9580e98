//! Brick device preparation
//!
//! Formats raw devices and mounts them so they can serve bricks. Placement
//! never calls into this module; it only sees the resulting mount paths.

pub mod device;
pub mod filesystem;

pub use device::{mount_path_for, BrickDevice};
pub use filesystem::{initialize_devices, Filesystem, FormatPlan, Invocation, MetadataProfile};
