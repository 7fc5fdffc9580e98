//! Filesystem formatting for new brick devices
//!
//! Each [`Filesystem`] variant turns a device into a [`FormatPlan`]: the
//! mkfs (or zpool) invocation plus the commands to run after it succeeds.
//! Plans are plain data so they can be inspected before anything runs.

use crate::common::{command_line, CommandRunner, Error, Result};
use crate::storage::device::{device_name, BrickDevice};
use std::fmt;
use std::str::FromStr;

/// One external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    pub fn run(&self, runner: &dyn CommandRunner) -> Result<String> {
        runner.run(&self.program, &self.args)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&command_line(&self.program, &self.args))
    }
}

/// Format command and its ordered follow-ups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPlan {
    pub command: Invocation,
    pub follow_ups: Vec<Invocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataProfile {
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
    Single,
    Dup,
}

impl fmt::Display for MetadataProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetadataProfile::Raid0 => "raid0",
            MetadataProfile::Raid1 => "raid1",
            MetadataProfile::Raid5 => "raid5",
            MetadataProfile::Raid6 => "raid6",
            MetadataProfile::Raid10 => "raid10",
            MetadataProfile::Single => "single",
            MetadataProfile::Dup => "dup",
        })
    }
}

/// Supported brick filesystems and their tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filesystem {
    Xfs {
        /// Rounded up to a power of two
        block_size: Option<u64>,
        inode_size: u64,
        stripe_size: Option<u64>,
        stripe_width: Option<u64>,
        force: bool,
    },
    Ext4 {
        inode_size: u64,
        reserved_blocks_percentage: u8,
        stride: Option<u64>,
        stripe_width: Option<u64>,
    },
    Btrfs {
        metadata_profile: MetadataProfile,
        leaf_size: u64,
        node_size: u64,
    },
    Zfs {
        /// Record size, rounded up to a power of two
        block_size: Option<u64>,
        compression: bool,
    },
}

impl Filesystem {
    pub fn xfs() -> Self {
        Filesystem::Xfs {
            block_size: None,
            inode_size: 512,
            stripe_size: None,
            stripe_width: None,
            force: true,
        }
    }

    pub fn ext4() -> Self {
        Filesystem::Ext4 {
            inode_size: 512,
            reserved_blocks_percentage: 0,
            stride: None,
            stripe_width: None,
        }
    }

    pub fn btrfs() -> Self {
        Filesystem::Btrfs {
            metadata_profile: MetadataProfile::Single,
            leaf_size: 16384,
            node_size: 16384,
        }
    }

    pub fn zfs() -> Self {
        Filesystem::Zfs {
            block_size: None,
            compression: false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filesystem::Xfs { .. } => "xfs",
            Filesystem::Ext4 { .. } => "ext4",
            Filesystem::Btrfs { .. } => "btrfs",
            Filesystem::Zfs { .. } => "zfs",
        }
    }

    /// ZFS mounts its pool itself.
    pub fn mounts_itself(&self) -> bool {
        matches!(self, Filesystem::Zfs { .. })
    }

    pub fn format_plan(&self, device: &BrickDevice) -> FormatPlan {
        let dev = device.dev_path.clone();
        match self {
            Filesystem::Xfs {
                block_size,
                inode_size,
                stripe_size,
                stripe_width,
                force,
            } => {
                let mut args = vec!["-i".to_string(), format!("size={}", inode_size)];
                if *force {
                    args.push("-f".to_string());
                }
                if let Some(block_size) = block_size {
                    let rounded = block_size.next_power_of_two();
                    if rounded != *block_size {
                        tracing::info!(
                            "block_size {} is not a power of two. Rounding up to {}",
                            block_size,
                            rounded
                        );
                    }
                    args.push("-b".to_string());
                    args.push(format!("size={}", rounded));
                }
                if let (Some(su), Some(sw)) = (stripe_size, stripe_width) {
                    args.push("-d".to_string());
                    args.push(format!("su={}", su));
                    args.push(format!("sw={}", sw));
                }
                args.push(dev);
                FormatPlan {
                    command: Invocation::new("/sbin/mkfs.xfs", args),
                    follow_ups: Vec::new(),
                }
            }
            Filesystem::Ext4 {
                inode_size,
                reserved_blocks_percentage,
                stride,
                stripe_width,
            } => {
                let mut args = vec![
                    "-m".to_string(),
                    reserved_blocks_percentage.to_string(),
                    "-I".to_string(),
                    inode_size.to_string(),
                ];
                if let Some(stride) = stride {
                    args.push("-E".to_string());
                    args.push(format!("stride={}", stride));
                }
                if let Some(stripe_width) = stripe_width {
                    args.push("-E".to_string());
                    args.push(format!("stripe_width={}", stripe_width));
                }
                args.push(dev);
                FormatPlan {
                    command: Invocation::new("mkfs.ext4", args),
                    follow_ups: Vec::new(),
                }
            }
            Filesystem::Btrfs {
                metadata_profile,
                leaf_size,
                node_size,
            } => FormatPlan {
                command: Invocation::new(
                    "mkfs.btrfs",
                    vec![
                        "-m".to_string(),
                        metadata_profile.to_string(),
                        "-l".to_string(),
                        leaf_size.to_string(),
                        "-n".to_string(),
                        node_size.to_string(),
                        dev,
                    ],
                ),
                follow_ups: Vec::new(),
            },
            Filesystem::Zfs {
                block_size,
                compression,
            } => {
                let pool = device_name(&device.dev_path).to_string();
                let command = Invocation::new(
                    "/sbin/zpool",
                    vec![
                        "create".to_string(),
                        "-f".to_string(),
                        "-m".to_string(),
                        format!("/mnt/{}", pool),
                        pool.clone(),
                        dev,
                    ],
                );
                let zfs_set = |prop: String| {
                    Invocation::new("/sbin/zfs", vec!["set".to_string(), prop, pool.clone()])
                };

                let mut follow_ups = Vec::new();
                if let Some(block_size) = block_size {
                    follow_ups.push(zfs_set(format!(
                        "recordsize={}",
                        block_size.next_power_of_two()
                    )));
                }
                if *compression {
                    follow_ups.push(zfs_set("compression=on".to_string()));
                }
                follow_ups.push(zfs_set("acltype=posixacl".to_string()));
                follow_ups.push(zfs_set("atime=off".to_string()));
                FormatPlan {
                    command,
                    follow_ups,
                }
            }
        }
    }
}

impl FromStr for Filesystem {
    type Err = Error;

    /// Default tuning for the named filesystem.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "xfs" => Ok(Filesystem::xfs()),
            "ext4" => Ok(Filesystem::ext4()),
            "btrfs" => Ok(Filesystem::btrfs()),
            "zfs" => Ok(Filesystem::zfs()),
            other => Err(Error::InvalidConfig(format!(
                "unsupported filesystem_type: {}",
                other
            ))),
        }
    }
}

/// Format and mount every uninitialized block device, one at a time.
///
/// Returns the mount paths ready to serve bricks: already initialized devices
/// first, then freshly formatted ones, each group in input order. A device
/// whose format or mount fails is logged and left out.
pub fn initialize_devices(
    devices: &[BrickDevice],
    fs: &Filesystem,
    runner: &dyn CommandRunner,
) -> Vec<String> {
    let mut ready: Vec<String> = devices
        .iter()
        .filter(|d| d.initialized)
        .map(|d| d.mount_path.clone())
        .collect();

    for device in devices.iter().filter(|d| !d.initialized) {
        if !device.is_block_device {
            tracing::warn!("Skipping invalid block device: {}", device.dev_path);
            continue;
        }
        match initialize_device(device, fs, runner) {
            Ok(()) => ready.push(device.mount_path.clone()),
            Err(e) => tracing::error!("Failed to initialize {}: {}", device.dev_path, e),
        }
    }
    ready
}

fn initialize_device(
    device: &BrickDevice,
    fs: &Filesystem,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let plan = fs.format_plan(device);
    tracing::info!("Formatting block device with {}: {}", fs.name(), device.dev_path);
    plan.command.run(runner)?;
    for follow_up in &plan.follow_ups {
        follow_up.run(runner)?;
    }
    if !fs.mounts_itself() {
        tracing::info!(
            "Mounting block device {} at {}",
            device.dev_path,
            device.mount_path
        );
        runner.run("mkdir", &["-p".to_string(), device.mount_path.clone()])?;
        runner.run("mount", &[device.dev_path.clone(), device.mount_path.clone()])?;
    }
    Ok(())
}
