//! Configuration for brickwork
//!
//! Every knob is kept as the raw string the operator wrote. Parsing happens
//! later, in [`VolumeSettings::from_source`], which never fails: bad numbers
//! and unknown names fall back to defaults.

use crate::cluster::features::SplitBrainPolicy;
use crate::cluster::volume::VolumeType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default replication factor when `replication_level` is missing or unusable.
pub const DEFAULT_REPLICATION: usize = 3;
/// Default for `extra_level` (arbiter, stripe, redundancy or disperse count).
pub const DEFAULT_EXTRA: usize = 1;

/// Environment variable prefix, e.g. `BRICKWORK_VOLUME_NAME`.
pub const ENV_PREFIX: &str = "BRICKWORK";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the managed volume
    #[serde(default = "default_volume_name")]
    pub volume_name: String,

    /// Volume topology, e.g. "replicate" or "distributed-disperse"
    #[serde(default = "default_cluster_type")]
    pub cluster_type: String,

    /// Replica (or disperse, or stripe) count
    #[serde(default = "default_replication_level")]
    pub replication_level: String,

    /// Secondary count whose meaning depends on the cluster type
    #[serde(default = "default_extra_level")]
    pub extra_level: String,

    /// Filesystem used when formatting new brick devices
    #[serde(default = "default_filesystem_type")]
    pub filesystem_type: String,

    /// Directory on the cluster mount holding rollout markers
    #[serde(default = "default_marker_dir")]
    pub marker_dir: PathBuf,

    /// glusterd identity file holding the local peer UUID
    #[serde(default = "default_glusterd_info")]
    pub glusterd_info: PathBuf,

    /// Enable bitrot detection after the volume starts
    #[serde(default)]
    pub bitrot_detection: bool,

    /// `cluster.favorite-child-policy` for the new volume: ctime, none,
    /// majority, mtime or size. Unset leaves glusterd's default.
    #[serde(default)]
    pub splitbrain_policy: Option<String>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_volume_name() -> String {
    "test".to_string()
}
fn default_cluster_type() -> String {
    "replicate".to_string()
}
fn default_replication_level() -> String {
    DEFAULT_REPLICATION.to_string()
}
fn default_extra_level() -> String {
    DEFAULT_EXTRA.to_string()
}
fn default_filesystem_type() -> String {
    "xfs".to_string()
}
fn default_marker_dir() -> PathBuf {
    PathBuf::from("/mnt/glusterfs/.upgrade")
}
fn default_glusterd_info() -> PathBuf {
    PathBuf::from("/var/lib/glusterd/glusterd.info")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume_name: default_volume_name(),
            cluster_type: default_cluster_type(),
            replication_level: default_replication_level(),
            extra_level: default_extra_level(),
            filesystem_type: default_filesystem_type(),
            marker_dir: default_marker_dir(),
            glusterd_info: default_glusterd_info(),
            bitrot_detection: false,
            splitbrain_policy: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then let `BRICKWORK_*` environment
    /// variables override individual keys.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(false))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Raw string lookup for the handful of knobs the planner reads.
pub trait ConfigSource {
    fn raw(&self, key: &str) -> Option<String>;
}

impl ConfigSource for Config {
    fn raw(&self, key: &str) -> Option<String> {
        match key {
            "volume_name" => Some(self.volume_name.clone()),
            "cluster_type" => Some(self.cluster_type.clone()),
            "replication_level" => Some(self.replication_level.clone()),
            "extra_level" => Some(self.extra_level.clone()),
            "filesystem_type" => Some(self.filesystem_type.clone()),
            "splitbrain_policy" => self.splitbrain_policy.clone(),
            _ => None,
        }
    }
}

impl ConfigSource for HashMap<String, String> {
    fn raw(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// The parsed, always-valid view of the volume knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSettings {
    pub volume_name: String,
    pub cluster_type: VolumeType,
    pub replicas: usize,
    pub extra: usize,
    pub splitbrain_policy: Option<SplitBrainPolicy>,
}

impl VolumeSettings {
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let volume_name = source
            .raw("volume_name")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_volume_name);

        let cluster_type = match source.raw("cluster_type") {
            Some(raw) => raw.parse::<VolumeType>().unwrap_or_else(|_| {
                tracing::warn!("Unknown cluster_type {:?}, using replicate", raw);
                VolumeType::Replicate
            }),
            None => VolumeType::Replicate,
        };

        let splitbrain_policy = source
            .raw("splitbrain_policy")
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| match raw.parse::<SplitBrainPolicy>() {
                Ok(policy) => Some(policy),
                Err(_) => {
                    tracing::warn!("Unknown splitbrain_policy {:?}, leaving it unset", raw);
                    None
                }
            });

        Self {
            volume_name,
            cluster_type,
            splitbrain_policy,
            replicas: replication_factor(source.raw("replication_level").as_deref()),
            extra: parse_count(source.raw("extra_level").as_deref(), DEFAULT_EXTRA),
        }
    }
}

/// Parse a replication factor, defaulting to 3 for anything that is not a
/// positive integer.
pub fn replication_factor(raw: Option<&str>) -> usize {
    parse_count(raw, DEFAULT_REPLICATION)
}

fn parse_count(raw: Option<&str>, default: usize) -> usize {
    match raw.map(str::trim).map(str::parse::<usize>) {
        Some(Ok(n)) if n > 0 => n,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_replication_factor_defaults() {
        assert_eq!(replication_factor(Some("2")), 2);
        assert_eq!(replication_factor(Some(" 4 ")), 4);
        assert_eq!(replication_factor(Some("three")), 3);
        assert_eq!(replication_factor(Some("0")), 3);
        assert_eq!(replication_factor(Some("-1")), 3);
        assert_eq!(replication_factor(None), 3);
    }

    #[test]
    fn test_volume_settings_parse() {
        let settings = VolumeSettings::from_source(&source(&[
            ("volume_name", "data"),
            ("cluster_type", "Distributed-Disperse"),
            ("replication_level", "6"),
            ("extra_level", "2"),
        ]));
        assert_eq!(settings.volume_name, "data");
        assert_eq!(settings.cluster_type, VolumeType::DistributedAndDisperse);
        assert_eq!(settings.replicas, 6);
        assert_eq!(settings.extra, 2);
        assert_eq!(settings.splitbrain_policy, None);
    }

    #[test]
    fn test_splitbrain_policy_setting() {
        let settings = VolumeSettings::from_source(&source(&[("splitbrain_policy", "mtime")]));
        assert_eq!(settings.splitbrain_policy, Some(SplitBrainPolicy::Mtime));
        let settings = VolumeSettings::from_source(&source(&[("splitbrain_policy", "newest")]));
        assert_eq!(settings.splitbrain_policy, None);
    }

    #[test]
    fn test_volume_settings_never_fail() {
        let settings = VolumeSettings::from_source(&source(&[
            ("cluster_type", "raid-z"),
            ("replication_level", "lots"),
            ("extra_level", ""),
        ]));
        assert_eq!(settings.volume_name, "test");
        assert_eq!(settings.cluster_type, VolumeType::Replicate);
        assert_eq!(settings.replicas, 3);
        assert_eq!(settings.extra, 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "volume_name = \"media\"").unwrap();
        writeln!(file, "cluster_type = \"arbiter\"").unwrap();
        writeln!(file, "replication_level = \"3\"").unwrap();
        writeln!(file, "marker_dir = \"/tmp/markers\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.volume_name, "media");
        assert_eq!(config.cluster_type, "arbiter");
        assert_eq!(config.extra_level, "1");
        assert_eq!(config.marker_dir, PathBuf::from("/tmp/markers"));
        assert!(!config.bitrot_detection);
    }
}
