//! Gluster CLI collaborator
//!
//! [`ClusterCli`] is the seam between the planning logic and glusterd. The
//! planner only decides which call to make and with which argument shape;
//! timeouts and retries belong to whoever implements the trait.
//!
//! [`GlusterCli`] is the production implementation. It shells out to
//! `gluster --mode=script` and parses the plain-text output of the few
//! queries the planner needs.

use crate::cluster::features::{BitrotOption, Quota};
use crate::cluster::peer::{Peer, State};
use crate::cluster::volume::{Brick, CreateVolume, Toggle, Transport, Volume, VolumeType};
use crate::common::{CommandRunner, Error, Result};
use std::collections::BTreeMap;
use uuid::Uuid;

pub trait ClusterCli {
    /// Peers other than the local one (`gluster peer status`).
    fn peer_status(&self) -> Result<Vec<Peer>>;
    /// All peers including the local one (`gluster pool list`).
    fn pool_list(&self) -> Result<Vec<Peer>>;
    /// `Ok(None)` when the volume does not exist.
    fn volume_info(&self, name: &str) -> Result<Option<Volume>>;
    fn volume_create(&self, request: &CreateVolume) -> Result<()>;
    fn volume_add_brick(&self, name: &str, bricks: &[Brick], force: bool) -> Result<()>;
    fn volume_remove_brick(&self, name: &str, bricks: &[Brick], force: bool) -> Result<()>;
    fn volume_start(&self, name: &str, force: bool) -> Result<()>;
    /// Submits every option in a single `volume set` call.
    fn volume_set_options(&self, name: &str, options: &BTreeMap<String, String>) -> Result<()>;
    /// Starts a rebalance and returns without waiting for it.
    fn volume_rebalance(&self, name: &str) -> Result<()>;
    fn volume_bitrot(&self, name: &str, toggle: Toggle) -> Result<()>;
    fn volume_bitrot_option(&self, name: &str, option: BitrotOption) -> Result<()>;
    fn volume_enable_quota(&self, name: &str) -> Result<()>;
    fn volume_limit_usage(&self, name: &str, path: &str, bytes: u64) -> Result<()>;
    fn volume_remove_quota(&self, name: &str, path: &str) -> Result<()>;
    fn volume_quota_list(&self, name: &str) -> Result<Vec<Quota>>;
}

pub const GLUSTER_BIN: &str = "gluster";

/// Runs the real `gluster` binary through a [`CommandRunner`].
pub struct GlusterCli<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> GlusterCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn gluster(&self, args: Vec<String>) -> Result<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("--mode=script".to_string());
        full.extend(args);
        self.runner.run(GLUSTER_BIN, &full)
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `volume create` arguments, without the leading `--mode=script`.
pub fn create_args(request: &CreateVolume) -> Result<Vec<String>> {
    if request.bricks.is_empty() {
        return Err(Error::EmptyBrickList(format!(
            "not creating volume {}",
            request.name
        )));
    }
    let mut args = strings(&["volume", "create", request.name.as_str()]);
    args.extend(request.layout.args());
    args.push("transport".to_string());
    args.push(request.transport.to_string());
    args.extend(request.bricks.iter().map(|b| b.to_string()));
    if request.force {
        args.push("force".to_string());
    }
    Ok(args)
}

impl<R: CommandRunner> ClusterCli for GlusterCli<R> {
    fn peer_status(&self) -> Result<Vec<Peer>> {
        let out = self.gluster(strings(&["peer", "status"]))?;
        parse_peer_status(&out)
    }

    fn pool_list(&self) -> Result<Vec<Peer>> {
        let out = self.gluster(strings(&["pool", "list"]))?;
        parse_pool_list(&out)
    }

    fn volume_info(&self, name: &str) -> Result<Option<Volume>> {
        match self.gluster(strings(&["volume", "info", name])) {
            Ok(out) => parse_volume_info(&out),
            Err(Error::CommandFailed { reason, .. }) if reason.contains("does not exist") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn volume_create(&self, request: &CreateVolume) -> Result<()> {
        self.gluster(create_args(request)?)?;
        Ok(())
    }

    fn volume_add_brick(&self, name: &str, bricks: &[Brick], force: bool) -> Result<()> {
        if bricks.is_empty() {
            return Err(Error::EmptyBrickList(format!("not expanding volume {}", name)));
        }
        let mut args = strings(&["volume", "add-brick", name]);
        args.extend(bricks.iter().map(|b| b.to_string()));
        if force {
            args.push("force".to_string());
        }
        self.gluster(args)?;
        Ok(())
    }

    fn volume_remove_brick(&self, name: &str, bricks: &[Brick], force: bool) -> Result<()> {
        if bricks.is_empty() {
            return Err(Error::EmptyBrickList(format!("not removing bricks from {}", name)));
        }
        let mut args = strings(&["volume", "remove-brick", name]);
        args.extend(bricks.iter().map(|b| b.to_string()));
        args.push(if force { "force" } else { "start" }.to_string());
        self.gluster(args)?;
        Ok(())
    }

    fn volume_start(&self, name: &str, force: bool) -> Result<()> {
        let mut args = strings(&["volume", "start", name]);
        if force {
            args.push("force".to_string());
        }
        self.gluster(args)?;
        Ok(())
    }

    fn volume_set_options(&self, name: &str, options: &BTreeMap<String, String>) -> Result<()> {
        if options.is_empty() {
            return Err(Error::InvalidConfig(format!("no options to set on {}", name)));
        }
        let mut args = strings(&["volume", "set", name]);
        for (key, value) in options {
            args.push(key.clone());
            args.push(value.clone());
        }
        self.gluster(args)?;
        Ok(())
    }

    fn volume_rebalance(&self, name: &str) -> Result<()> {
        self.gluster(strings(&["volume", "rebalance", name, "start"]))?;
        Ok(())
    }

    fn volume_bitrot(&self, name: &str, toggle: Toggle) -> Result<()> {
        let action = match toggle {
            Toggle::On => "enable",
            Toggle::Off => "disable",
        };
        self.gluster(strings(&["volume", "bitrot", name, action]))?;
        Ok(())
    }

    fn volume_bitrot_option(&self, name: &str, option: BitrotOption) -> Result<()> {
        let [setting, value] = option.args();
        self.gluster(strings(&["volume", "bitrot", name, setting, value]))?;
        Ok(())
    }

    fn volume_enable_quota(&self, name: &str) -> Result<()> {
        self.gluster(strings(&["volume", "quota", name, "enable"]))?;
        Ok(())
    }

    fn volume_limit_usage(&self, name: &str, path: &str, bytes: u64) -> Result<()> {
        self.gluster(strings(&[
            "volume",
            "quota",
            name,
            "limit-usage",
            path,
            bytes.to_string().as_str(),
        ]))?;
        Ok(())
    }

    fn volume_remove_quota(&self, name: &str, path: &str) -> Result<()> {
        self.gluster(strings(&["volume", "quota", name, "remove", path]))?;
        Ok(())
    }

    fn volume_quota_list(&self, name: &str) -> Result<Vec<Quota>> {
        let out = self.gluster(strings(&["volume", "quota", name, "list"]))?;
        parse_quota_list(&out)
    }
}

/// Parse `gluster volume quota <name> list`:
///
/// ```text
///     Path   Hard-limit  Soft-limit     Used  Available  Soft-limit exceeded? Hard-limit exceeded?
/// ---------------------------------------------------------------------------------------------------
/// /             1.0GB    80%(819.2MB)  0Bytes   1.0GB          No                   No
/// ```
///
/// The last six columns never contain spaces, so everything before them is
/// the path.
pub fn parse_quota_list(output: &str) -> Result<Vec<Quota>> {
    let mut quotas = Vec::new();
    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("Path") || line.starts_with('-') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            return Err(Error::Parse(format!("malformed quota line: {}", line)));
        }
        let split = fields.len() - 6;
        let cols = &fields[split..];
        quotas.push(Quota {
            path: fields[..split].join(" "),
            hard_limit: cols[0].to_string(),
            soft_limit: cols[1].to_string(),
            used: cols[2].to_string(),
            available: cols[3].to_string(),
            soft_limit_exceeded: cols[4] != "No",
            hard_limit_exceeded: cols[5] != "No",
        });
    }
    Ok(quotas)
}

/// Parse `gluster pool list`:
///
/// ```text
/// UUID                                  Hostname    State
/// 30602134-698f-4e53-8503-163e175aea85  localhost   Connected
/// ```
pub fn parse_pool_list(output: &str) -> Result<Vec<Peer>> {
    let mut peers = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() == Some(&"UUID") {
            continue;
        }
        if fields.len() < 3 {
            return Err(Error::Parse(format!("malformed pool list line: {}", line)));
        }
        let uuid = Uuid::parse_str(fields[0])
            .map_err(|e| Error::Parse(format!("invalid peer uuid {}: {}", fields[0], e)))?;
        let state: State = fields[2..].join(" ").parse()?;
        peers.push(Peer::new(Some(uuid), fields[1], Some(state)));
    }
    Ok(peers)
}

/// Parse `gluster peer status`:
///
/// ```text
/// Number of Peers: 1
///
/// Hostname: 10.0.0.2
/// Uuid: 5ac3c47b-5c3c-4d5a-9b0f-1a3c1f9f7c2e
/// State: Peer in Cluster (Connected)
/// ```
///
/// The parenthesised connection state wins over the handshake state when
/// both are present.
pub fn parse_peer_status(output: &str) -> Result<Vec<Peer>> {
    let mut peers = Vec::new();
    let mut hostname: Option<String> = None;
    let mut uuid: Option<Uuid> = None;

    for line in output.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Hostname" => hostname = Some(value.to_string()),
            "Uuid" => {
                uuid = Some(Uuid::parse_str(value).map_err(|e| {
                    Error::Parse(format!("invalid peer uuid {}: {}", value, e))
                })?)
            }
            "State" => {
                let state = match (value.rfind('('), value.rfind(')')) {
                    (Some(open), Some(close)) if open < close => &value[open + 1..close],
                    _ => value,
                };
                let host = hostname.take().ok_or_else(|| {
                    Error::Parse(format!("peer state without hostname: {}", line))
                })?;
                peers.push(Peer::new(uuid.take(), host, Some(state.parse()?)));
            }
            _ => {}
        }
    }
    Ok(peers)
}

/// Parse `gluster volume info <name>`. `Ok(None)` for empty output or
/// "No volumes present".
pub fn parse_volume_info(output: &str) -> Result<Option<Volume>> {
    let mut name = None;
    let mut vol_type = None;
    let mut volume = Volume::new("", VolumeType::Distribute);
    let mut in_options = false;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("No volumes present") {
            return Ok(None);
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if in_options {
            volume.options.insert(key.to_string(), value.to_string());
            continue;
        }

        match key {
            "Volume Name" => name = Some(value.to_string()),
            "Type" => vol_type = Some(value.parse::<VolumeType>()?),
            "Volume ID" => volume.id = Uuid::parse_str(value).ok(),
            "Status" => volume.status = value.to_string(),
            "Snapshot Count" => volume.snapshot_count = value.parse().unwrap_or(0),
            "Number of Bricks" => apply_brick_counts(&mut volume, value),
            "Transport-type" => volume.transport = value.parse().unwrap_or(Transport::Tcp),
            "Bricks" => {}
            "Options Reconfigured" => in_options = true,
            k if k.starts_with("Brick") && k[5..].chars().all(|c| c.is_ascii_digit()) => {
                volume.bricks.push(parse_brick(value)?);
            }
            _ => {}
        }
    }

    match (name, vol_type) {
        (Some(name), Some(vol_type)) => {
            volume.name = name;
            volume.vol_type = vol_type;
            Ok(Some(volume))
        }
        (None, None) => Ok(None),
        _ => Err(Error::Parse(
            "volume info is missing the name or type line".into(),
        )),
    }
}

/// `host:/path` optionally followed by ` (arbiter)`.
fn parse_brick(value: &str) -> Result<Brick> {
    let (location, is_arbiter) = match value.strip_suffix("(arbiter)") {
        Some(location) => (location.trim(), true),
        None => (value, false),
    };
    let (host, path) = location
        .split_once(':')
        .ok_or_else(|| Error::Parse(format!("malformed brick: {}", value)))?;
    let mut brick = Brick::new(Peer::with_address(host), path);
    brick.is_arbiter = is_arbiter;
    Ok(brick)
}

/// Interpret `Number of Bricks`, which glusterd prints as `3`, `2 x 3 = 6`,
/// `1 x (2 + 1) = 3` (arbiter) or `1 x (4 + 2) = 6` (disperse).
fn apply_brick_counts(volume: &mut Volume, value: &str) {
    let lhs = value.split('=').next().unwrap_or(value).trim();
    let (dist, set) = match lhs.split_once('x') {
        Some((dist, set)) => (dist.trim().parse().unwrap_or(1), set.trim()),
        None => (1, lhs),
    };
    volume.dist_count = dist;

    let inner = set.trim_start_matches('(').trim_end_matches(')');
    let numbers: Vec<usize> = inner
        .split('+')
        .filter_map(|n| n.trim().parse().ok())
        .collect();
    match (volume_kind(volume.vol_type), numbers.as_slice()) {
        (Kind::Disperse, [data, redundancy]) => {
            volume.disperse_count = data + redundancy;
            volume.redundancy_count = *redundancy;
        }
        (Kind::Replica, [data, arbiter]) => {
            volume.replica_count = data + arbiter;
            volume.arbiter_count = *arbiter;
        }
        (Kind::Replica, [replica]) => volume.replica_count = *replica,
        (Kind::Stripe, [stripe]) => volume.stripe_count = *stripe,
        _ => {}
    }
}

enum Kind {
    Replica,
    Stripe,
    Disperse,
    Plain,
}

fn volume_kind(vol_type: VolumeType) -> Kind {
    match vol_type {
        VolumeType::Replicate
        | VolumeType::DistributedAndReplicate
        | VolumeType::Arbiter
        | VolumeType::StripedAndReplicate
        | VolumeType::DistributedAndStripedAndReplicate => Kind::Replica,
        VolumeType::Stripe | VolumeType::DistributedAndStripe => Kind::Stripe,
        VolumeType::Disperse | VolumeType::DistributedAndDisperse => Kind::Disperse,
        VolumeType::Distribute => Kind::Plain,
    }
}
