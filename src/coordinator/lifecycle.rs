//! Volume lifecycle: create, expand and shrink
//!
//! Each operation turns a placement plan into at most one cluster CLI call
//! and reports the outcome as a [`Status`]. Waiting for more peers is a
//! normal outcome, not an error.

use crate::cluster::cli::ClusterCli;
use crate::cluster::peer::{wait_for_ready, ReadyPolicy};
use crate::cluster::volume::{Brick, CreateVolume, Status, Transport, Volume};
use crate::common::{Clock, VolumeSettings};
use crate::coordinator::placement::{select_peers, PeerEntry, Plan};
use crate::Result;

/// What a shrink attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShrinkOutcome {
    /// remove-brick was issued for these bricks
    Removed(Vec<Brick>),
    /// The differential produced a full replica set but no bricks
    NothingToRemove,
    WaitForMorePeers,
}

/// Drives volume creation and resizing against a [`ClusterCli`].
pub struct VolumeLifecycle<'a, C: ClusterCli> {
    cli: &'a C,
    clock: &'a dyn Clock,
    settings: VolumeSettings,
    ready: ReadyPolicy,
}

impl<'a, C: ClusterCli> VolumeLifecycle<'a, C> {
    pub fn new(cli: &'a C, clock: &'a dyn Clock, settings: VolumeSettings) -> Self {
        Self {
            cli,
            clock,
            settings,
            ready: ReadyPolicy::default(),
        }
    }

    pub fn with_ready_policy(mut self, policy: ReadyPolicy) -> Self {
        self.ready = policy;
        self
    }

    pub fn settings(&self) -> &VolumeSettings {
        &self.settings
    }

    pub fn cli(&self) -> &'a C {
        self.cli
    }

    /// Placement for `peers`, differential when `volume` is given.
    pub fn plan(&self, peers: &[PeerEntry], volume: Option<&Volume>) -> Plan {
        select_peers(peers, self.settings.replicas, volume)
    }

    /// Create the volume once every peer is connected.
    ///
    /// Blocks on the readiness wait first; a readiness timeout is returned as
    /// an error. A failing `volume create` is logged and reported as
    /// [`Status::FailedToCreate`], it is not retried.
    pub fn create_volume(&self, peers: &[PeerEntry]) -> Result<Status> {
        wait_for_ready(|| self.cli.peer_status(), self.clock, self.ready)?;

        let placement = match self.plan(peers, None) {
            Plan::WaitForMorePeers { .. } => return Ok(Status::WaitForMorePeers),
            Plan::Bricks(placement) => placement,
        };
        if placement.bricks.is_empty() {
            tracing::warn!(
                "No usable devices on {} peers, cannot create volume {}",
                peers.len(),
                self.settings.volume_name
            );
            return Ok(Status::InvalidConfig);
        }

        let layout = self
            .settings
            .cluster_type
            .layout(self.settings.replicas, self.settings.extra);
        tracing::info!(
            "Creating volume {} of type {} with brick list [{}]",
            self.settings.volume_name,
            self.settings.cluster_type,
            render(&placement.bricks)
        );
        let request = CreateVolume {
            name: self.settings.volume_name.clone(),
            layout,
            transport: Transport::Tcp,
            bricks: placement.bricks,
            force: true,
        };

        match self.cli.volume_create(&request) {
            Ok(()) => {
                tracing::info!("Created volume {}", request.name);
                Ok(Status::Created)
            }
            Err(e) => {
                tracing::error!("Volume creation failed: {}", e);
                Ok(Status::FailedToCreate)
            }
        }
    }

    /// Add bricks from peers that do not serve `volume` yet.
    ///
    /// Returns [`Status::InvalidConfig`] when the new peers bring no devices.
    /// Errors from `add-brick` propagate.
    pub fn expand_volume(&self, peers: &[PeerEntry], volume: &Volume) -> Result<Status> {
        tracing::info!(
            "Checking for new peers to expand the volume named {}",
            volume.name
        );
        let placement = match self.plan(peers, Some(volume)) {
            Plan::WaitForMorePeers { .. } => return Ok(Status::WaitForMorePeers),
            Plan::Bricks(placement) => placement,
        };
        if placement.bricks.is_empty() {
            return Ok(Status::InvalidConfig);
        }

        tracing::info!(
            "Expanding volume with brick list: [{}]",
            render(&placement.bricks)
        );
        self.cli
            .volume_add_brick(&volume.name, &placement.bricks, true)?;
        Ok(Status::Expanded)
    }

    /// Remove the bricks of a departing peer.
    ///
    /// The brick list comes from the same differential placement as
    /// expansion, restricted to `departing`. Errors from `remove-brick`
    /// propagate.
    pub fn shrink_volume(&self, departing: &PeerEntry, volume: &Volume) -> Result<ShrinkOutcome> {
        tracing::info!("Shrinking volume named {}", volume.name);
        let placement = match self.plan(std::slice::from_ref(departing), Some(volume)) {
            Plan::WaitForMorePeers { .. } => {
                tracing::info!("Waiting for more peers");
                return Ok(ShrinkOutcome::WaitForMorePeers);
            }
            Plan::Bricks(placement) => placement,
        };
        if placement.bricks.is_empty() {
            return Ok(ShrinkOutcome::NothingToRemove);
        }

        tracing::info!(
            "Shrinking volume with brick list: [{}]",
            render(&placement.bricks)
        );
        self.cli
            .volume_remove_brick(&volume.name, &placement.bricks, true)?;
        Ok(ShrinkOutcome::Removed(placement.bricks))
    }
}

fn render(bricks: &[Brick]) -> String {
    bricks
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
