//! Optional volume features: bitrot scrubbing, quotas and split-brain policy

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value of `cluster.favorite-child-policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitBrainPolicy {
    Ctime,
    /// Rendered as `none`
    Disable,
    Majority,
    Mtime,
    Size,
}

/// Option key the policy is stored under.
pub const FAVORITE_CHILD_POLICY: &str = "cluster.favorite-child-policy";

impl fmt::Display for SplitBrainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SplitBrainPolicy::Ctime => "ctime",
            SplitBrainPolicy::Disable => "none",
            SplitBrainPolicy::Majority => "majority",
            SplitBrainPolicy::Mtime => "mtime",
            SplitBrainPolicy::Size => "size",
        })
    }
}

impl FromStr for SplitBrainPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ctime" => Ok(SplitBrainPolicy::Ctime),
            "none" => Ok(SplitBrainPolicy::Disable),
            "majority" => Ok(SplitBrainPolicy::Majority),
            "mtime" => Ok(SplitBrainPolicy::Mtime),
            "size" => Ok(SplitBrainPolicy::Size),
            other => Err(Error::Parse(format!("unknown split brain policy: {}", other))),
        }
    }
}

/// Scrubber control verbs for `volume bitrot <name> scrub <verb>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubControl {
    Pause,
    Resume,
    Status,
    OnDemand,
}

/// How often the scrubber walks the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubSchedule {
    Hourly,
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
}

/// How hard the scrubber is allowed to hit the bricks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubAggression {
    Lazy,
    Normal,
    Aggressive,
}

impl ScrubControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrubControl::Pause => "pause",
            ScrubControl::Resume => "resume",
            ScrubControl::Status => "status",
            ScrubControl::OnDemand => "ondemand",
        }
    }
}

impl ScrubSchedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrubSchedule::Hourly => "hourly",
            ScrubSchedule::Daily => "daily",
            ScrubSchedule::Weekly => "weekly",
            ScrubSchedule::BiWeekly => "biweekly",
            ScrubSchedule::Monthly => "monthly",
        }
    }
}

impl ScrubAggression {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrubAggression::Lazy => "lazy",
            ScrubAggression::Normal => "normal",
            ScrubAggression::Aggressive => "aggressive",
        }
    }
}

impl FromStr for ScrubControl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "pause" => Ok(ScrubControl::Pause),
            "resume" => Ok(ScrubControl::Resume),
            "status" => Ok(ScrubControl::Status),
            "ondemand" => Ok(ScrubControl::OnDemand),
            other => Err(Error::Parse(format!("unknown scrub control: {}", other))),
        }
    }
}

impl FromStr for ScrubSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "hourly" => Ok(ScrubSchedule::Hourly),
            "daily" => Ok(ScrubSchedule::Daily),
            "weekly" => Ok(ScrubSchedule::Weekly),
            "biweekly" => Ok(ScrubSchedule::BiWeekly),
            "monthly" => Ok(ScrubSchedule::Monthly),
            other => Err(Error::Parse(format!("unknown scrub frequency: {}", other))),
        }
    }
}

impl FromStr for ScrubAggression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "lazy" => Ok(ScrubAggression::Lazy),
            "normal" => Ok(ScrubAggression::Normal),
            "aggressive" => Ok(ScrubAggression::Aggressive),
            other => Err(Error::Parse(format!("unknown scrub throttle: {}", other))),
        }
    }
}

/// A setting of the bitrot daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrotOption {
    Scrub(ScrubControl),
    ScrubFrequency(ScrubSchedule),
    ScrubThrottle(ScrubAggression),
}

impl BitrotOption {
    /// Arguments following `volume bitrot <name>`.
    pub fn args(&self) -> [&'static str; 2] {
        match self {
            BitrotOption::Scrub(control) => ["scrub", control.as_str()],
            BitrotOption::ScrubFrequency(schedule) => ["scrub-frequency", schedule.as_str()],
            BitrotOption::ScrubThrottle(aggression) => ["scrub-throttle", aggression.as_str()],
        }
    }
}

/// One row of `gluster volume quota <name> list`. Sizes are kept as glusterd
/// prints them (`1.0GB`, `80%(819.2MB)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub path: String,
    pub hard_limit: String,
    pub soft_limit: String,
    pub used: String,
    pub available: String,
    pub soft_limit_exceeded: bool,
    pub hard_limit_exceeded: bool,
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path:{} limit:{} used:{}",
            self.path, self.hard_limit, self.used
        )
    }
}
