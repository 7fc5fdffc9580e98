//! Leaderless rolling upgrade
//!
//! Peers upgrade one at a time in ascending UUID order. Nobody hands out
//! turns: each peer waits for the `done` marker of the peer sorted just
//! before it, then writes its own `start` marker, upgrades and writes `done`.
//!
//! A predecessor that wrote `start` more than the liveness threshold ago
//! without writing `done` is presumed dead and skipped. Under clock skew two
//! successors of the same stalled peer can both reach that verdict around
//! the deadline. That window is accepted, not closed.
//!
//! A `start` marker that exists but cannot be read counts as started at the
//! moment it was first seen, so the successor keeps waiting and the liveness
//! threshold still bounds the wait.

use crate::cluster::peer::Peer;
use crate::common::{Clock, Error, Result};
use crate::coordinator::markers::{MarkerKey, MarkerStore};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Per-peer rollout progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutState {
    NotStarted,
    Waiting,
    Upgrading,
    Done,
}

/// Timing knobs of the rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutPolicy {
    /// Age of an unfinished `start` marker after which its owner is presumed dead
    pub liveness_threshold: Duration,
    /// Lower bound of the poll interval, inclusive
    pub min_jitter: Duration,
    /// Upper bound of the poll interval, exclusive
    pub max_jitter: Duration,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            liveness_threshold: Duration::from_secs(600),
            min_jitter: Duration::from_secs(5),
            max_jitter: Duration::from_secs(30),
        }
    }
}

/// Why a peer stopped waiting on its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredecessorOutcome {
    Finished,
    /// No `start` marker: nothing to wait for
    NeverStarted,
    PresumedDead { age: Duration },
}

/// Installs packages on the local peer.
pub trait Upgrader {
    fn installed_version(&self) -> Result<String>;
    /// `None` when no candidate is available.
    fn candidate_version(&self) -> Result<Option<String>>;
    fn upgrade(&self, version: &str) -> Result<()>;
}

/// What one call to [`RolloutCoordinator::roll`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutReport {
    pub peer: Uuid,
    pub version: String,
    /// Index of the local peer in UUID order
    pub position: usize,
    /// Predecessor UUID and how the wait for it ended; `None` for the head
    pub predecessor: Option<(Uuid, PredecessorOutcome)>,
    /// Marker polls made while waiting
    pub polls: usize,
    /// Total time slept while waiting
    pub waited: Duration,
    /// States visited, in order
    pub history: Vec<RolloutState>,
}

impl RolloutReport {
    pub fn state(&self) -> RolloutState {
        self.history
            .last()
            .copied()
            .unwrap_or(RolloutState::NotStarted)
    }
}

/// Sequences the local upgrade behind its predecessor.
pub struct RolloutCoordinator<'a, S: MarkerStore, U: Upgrader> {
    store: &'a S,
    clock: &'a dyn Clock,
    upgrader: &'a U,
    policy: RolloutPolicy,
    rng: StdRng,
    /// First sighting of a start marker whose timestamp was unreadable
    unreadable_start: Option<(MarkerKey, DateTime<Utc>)>,
}

impl<'a, S: MarkerStore, U: Upgrader> RolloutCoordinator<'a, S, U> {
    pub fn new(store: &'a S, clock: &'a dyn Clock, upgrader: &'a U) -> Self {
        Self {
            store,
            clock,
            upgrader,
            policy: RolloutPolicy::default(),
            rng: StdRng::from_entropy(),
            unreadable_start: None,
        }
    }

    pub fn with_policy(mut self, policy: RolloutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fix the jitter sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn upgrader(&self) -> &U {
        self.upgrader
    }

    /// Upgrade the local peer to `version` once its turn comes.
    ///
    /// `peers` is the full pool including the local peer. Peers without a
    /// UUID cannot take part and are ignored.
    pub fn roll(&mut self, local: Uuid, peers: &[Peer], version: &str) -> Result<RolloutReport> {
        let order = rollout_order(peers);
        let position = order
            .iter()
            .position(|id| *id == local)
            .ok_or_else(|| Error::LocalPeerNotFound(local.to_string()))?;

        let mut report = RolloutReport {
            peer: local,
            version: version.to_string(),
            position,
            predecessor: None,
            polls: 0,
            waited: Duration::ZERO,
            history: vec![RolloutState::NotStarted],
        };

        if position == 0 {
            tracing::info!("I am first, rolling upgrade to {}", version);
        } else {
            let predecessor = order[position - 1];
            report.history.push(RolloutState::Waiting);
            tracing::info!(
                "Waiting on {} to finish upgrading to {}",
                predecessor,
                version
            );
            let outcome = self.wait_on_predecessor(predecessor, version, &mut report)?;
            report.predecessor = Some((predecessor, outcome));
        }

        self.lock_and_roll(local, version, &mut report)?;
        Ok(report)
    }

    /// One poll of the predecessor's markers. `None` means keep waiting.
    pub fn check_predecessor(
        &mut self,
        predecessor: Uuid,
        version: &str,
    ) -> Result<Option<PredecessorOutcome>> {
        if self.store.exists(&MarkerKey::done(predecessor, version))? {
            return Ok(Some(PredecessorOutcome::Finished));
        }
        let start_key = MarkerKey::start(predecessor, version);
        if !self.store.exists(&start_key)? {
            tracing::info!(
                "{} has no start marker for {}, nothing to wait for",
                predecessor,
                version
            );
            return Ok(Some(PredecessorOutcome::NeverStarted));
        }
        let started = match self.store.read(&start_key)? {
            Some(started) => started,
            None => self.first_sighting(start_key),
        };

        let age = self
            .clock
            .now()
            .signed_duration_since(started)
            .to_std()
            .unwrap_or_default();
        if age > self.policy.liveness_threshold {
            tracing::warn!(
                "{} started upgrading {:?} ago and never finished, presuming it dead",
                predecessor,
                age
            );
            return Ok(Some(PredecessorOutcome::PresumedDead { age }));
        }
        Ok(None)
    }

    /// Treat an unreadable start marker as written when first seen.
    fn first_sighting(&mut self, key: MarkerKey) -> DateTime<Utc> {
        match &self.unreadable_start {
            Some((seen, at)) if *seen == key => *at,
            _ => {
                let now = self.clock.now();
                tracing::warn!(
                    "Start marker {} is unreadable, treating it as written now",
                    key
                );
                self.unreadable_start = Some((key, now));
                now
            }
        }
    }

    fn wait_on_predecessor(
        &mut self,
        predecessor: Uuid,
        version: &str,
        report: &mut RolloutReport,
    ) -> Result<PredecessorOutcome> {
        loop {
            report.polls += 1;
            if let Some(outcome) = self.check_predecessor(predecessor, version)? {
                return Ok(outcome);
            }
            let pause = self.jitter();
            tracing::debug!("{} is still upgrading, sleeping {:?}", predecessor, pause);
            self.clock.sleep(pause);
            report.waited += pause;
        }
    }

    /// Whole seconds drawn from `[min_jitter, max_jitter)`.
    fn jitter(&mut self) -> Duration {
        let min = self.policy.min_jitter.as_secs();
        let max = self.policy.max_jitter.as_secs();
        if max <= min {
            return self.policy.min_jitter;
        }
        Duration::from_secs(self.rng.gen_range(min..max))
    }

    fn lock_and_roll(
        &self,
        local: Uuid,
        version: &str,
        report: &mut RolloutReport,
    ) -> Result<()> {
        self.store
            .create_if_absent(&MarkerKey::start(local, version), self.clock.now())?;
        report.history.push(RolloutState::Upgrading);

        tracing::info!("Upgrading {} to {}", local, version);
        self.upgrader.upgrade(version)?;

        self.store
            .create_if_absent(&MarkerKey::done(local, version), self.clock.now())?;
        report.history.push(RolloutState::Done);
        tracing::info!("Upgrade of {} to {} done", local, version);
        Ok(())
    }
}

/// Distinct peer UUIDs in ascending order.
pub fn rollout_order(peers: &[Peer]) -> Vec<Uuid> {
    let mut order: Vec<Uuid> = peers.iter().filter_map(|peer| peer.uuid).collect();
    order.sort();
    order.dedup();
    order
}
