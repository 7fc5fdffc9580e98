//! Operator actions on a running volume
//!
//! Quota changes check `features.quota` on a fresh `volume info` first, so
//! quotas are switched on exactly once and never touched while off.

use crate::cluster::cli::ClusterCli;
use crate::cluster::features::Quota;
use crate::cluster::volume::Volume;
use crate::common::{Error, Result};
use std::collections::BTreeMap;

fn fetch<C: ClusterCli>(cli: &C, name: &str) -> Result<Volume> {
    cli.volume_info(name)?
        .ok_or_else(|| Error::InvalidConfig(format!("volume {} does not exist", name)))
}

/// Limit `path` to `bytes`, enabling quotas on the volume first if needed.
pub fn create_quota<C: ClusterCli>(cli: &C, name: &str, path: &str, bytes: u64) -> Result<()> {
    if !fetch(cli, name)?.quota_enabled()? {
        tracing::info!("Enabling quotas on {}", name);
        cli.volume_enable_quota(name)?;
    }
    cli.volume_limit_usage(name, path, bytes)?;
    tracing::info!("Quota of {} bytes set on {}:{}", bytes, name, path);
    Ok(())
}

/// Drop the quota on `path`. Returns false when quotas are off.
pub fn delete_quota<C: ClusterCli>(cli: &C, name: &str, path: &str) -> Result<bool> {
    if !fetch(cli, name)?.quota_enabled()? {
        tracing::info!("Quotas are off on {}, nothing to remove", name);
        return Ok(false);
    }
    cli.volume_remove_quota(name, path)?;
    Ok(true)
}

/// Quotas configured on the volume, empty when quotas are off.
pub fn list_quotas<C: ClusterCli>(cli: &C, name: &str) -> Result<Vec<Quota>> {
    if !fetch(cli, name)?.quota_enabled()? {
        return Ok(Vec::new());
    }
    cli.volume_quota_list(name)
}

/// Parse `key=value` pairs given on the command line.
pub fn parse_option_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut options = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig(format!("expected key=value, got {}", pair)))?;
        options.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(options)
}
