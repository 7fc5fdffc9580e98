//! Brick devices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A raw device that backs, or will back, a brick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrickDevice {
    pub is_block_device: bool,
    /// Already formatted and mounted
    pub initialized: bool,
    pub mount_path: String,
    pub dev_path: String,
}

impl BrickDevice {
    /// A block device mounted under `/mnt/<device name>`.
    pub fn new(dev_path: impl Into<String>, initialized: bool) -> Self {
        let dev_path = dev_path.into();
        Self {
            is_block_device: true,
            initialized,
            mount_path: mount_path_for(&dev_path),
            dev_path,
        }
    }
}

impl fmt::Display for BrickDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "is block device: {} initialized: {} mount path: {} dev path: {}",
            self.is_block_device, self.initialized, self.mount_path, self.dev_path
        )
    }
}

/// `/dev/vdb` mounts at `/mnt/vdb`.
pub fn mount_path_for(dev_path: &str) -> String {
    let name = device_name(dev_path);
    format!("/mnt/{}", name)
}

/// Last path component of a device path.
pub fn device_name(dev_path: &str) -> &str {
    Path::new(dev_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(dev_path)
}
