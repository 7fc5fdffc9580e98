//! Peer connectivity states and the readiness gate
//!
//! Peers walk through a number of probe/handshake states before glusterd
//! reports them as `Connected`. Volume creation only proceeds once every peer
//! is exactly `Connected`; intermediate states such as `Peer in Cluster` do
//! not count.

use crate::common::{Clock, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Connection/probe state of a peer as reported by glusterd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Connected,
    Disconnected,
    Unknown,
    EstablishingConnection,
    ProbeSentToPeer,
    ProbeReceivedFromPeer,
    PeerInCluster,
    AcceptedPeerRequest,
    SentAndReceivedPeerRequest,
    PeerRejected,
    PeerDetachInProgress,
    ConnectedToPeer,
    PeerIsConnectedAndAccepted,
    InvalidState,
}

impl State {
    pub const ALL: [State; 14] = [
        State::Connected,
        State::Disconnected,
        State::Unknown,
        State::EstablishingConnection,
        State::ProbeSentToPeer,
        State::ProbeReceivedFromPeer,
        State::PeerInCluster,
        State::AcceptedPeerRequest,
        State::SentAndReceivedPeerRequest,
        State::PeerRejected,
        State::PeerDetachInProgress,
        State::ConnectedToPeer,
        State::PeerIsConnectedAndAccepted,
        State::InvalidState,
    ];

    /// The string glusterd prints for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Connected => "connected",
            State::Disconnected => "disconnected",
            State::Unknown => "",
            State::EstablishingConnection => "establishing connection",
            State::ProbeSentToPeer => "probe sent to peer",
            State::ProbeReceivedFromPeer => "probe received from peer",
            State::PeerInCluster => "peer in cluster",
            State::AcceptedPeerRequest => "accepted peer in cluster",
            State::SentAndReceivedPeerRequest => "sent and received peer request",
            State::PeerRejected => "peer rejected",
            State::PeerDetachInProgress => "peer detach in progress",
            State::ConnectedToPeer => "connected to peer",
            State::PeerIsConnectedAndAccepted => "peer is connected and accepted",
            State::InvalidState => "invalid state",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = Error;

    /// Exact, case-insensitive match. An empty string is rejected rather than
    /// mapped to `Unknown`, and there is no fallback variant.
    fn from_str(s: &str) -> Result<Self> {
        if !s.is_empty() {
            if let Some(state) = State::ALL
                .iter()
                .find(|state| state.as_str().eq_ignore_ascii_case(s))
            {
                return Ok(*state);
            }
        }
        Err(Error::ParseState(s.to_string()))
    }
}

/// A cluster member, roughly equivalent to a server.
///
/// Snapshots are taken per query and never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub uuid: Option<Uuid>,
    /// Address of the peer (usually an IP address)
    pub hostname: String,
    pub status: Option<State>,
}

impl Peer {
    pub fn new(uuid: Option<Uuid>, hostname: impl Into<String>, status: Option<State>) -> Self {
        Self {
            uuid,
            hostname: hostname.into(),
            status,
        }
    }

    /// A peer known only by its address, as in a placement or a brick parsed
    /// from `volume info`.
    pub fn with_address(hostname: impl Into<String>) -> Self {
        Self::new(None, hostname, None)
    }
}

/// Peers are the same peer iff their UUIDs match.
impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Peer {}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = self.uuid.map(|u| u.to_string()).unwrap_or_default();
        let status = self.status.map(|s| s.to_string()).unwrap_or_default();
        write!(
            f,
            "UUID: {}  Hostname: {} Status: {}",
            uuid, self.hostname, status
        )
    }
}

/// True iff every peer's status is exactly `Connected`.
pub fn is_ready(peers: &[Peer]) -> bool {
    tracing::debug!("Checking if peers are ready");
    peers.iter().all(|peer| peer.status == Some(State::Connected))
}

/// Bounds of the readiness spin-wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPolicy {
    pub interval: Duration,
    pub max_iterations: usize,
}

impl Default for ReadyPolicy {
    /// One poll per second for ten minutes.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_iterations: 600,
        }
    }
}

/// Poll until every peer is `Connected`.
///
/// Each iteration polls, then sleeps `interval`. After `max_iterations`
/// iterations without readiness this fails with
/// [`Error::CoordinationTimeout`]. Errors from `poll` are returned as is.
pub fn wait_for_ready<F>(mut poll: F, clock: &dyn Clock, policy: ReadyPolicy) -> Result<()>
where
    F: FnMut() -> Result<Vec<Peer>>,
{
    tracing::info!("Waiting for all peers to enter the Connected state");
    for iteration in 0..policy.max_iterations {
        let peers = poll()?;
        if is_ready(&peers) {
            tracing::info!("All {} peers ready after {} polls", peers.len(), iteration + 1);
            return Ok(());
        }
        clock.sleep(policy.interval);
    }
    Err(Error::CoordinationTimeout(format!(
        "peers failed to connect after {:?}",
        policy.interval * policy.max_iterations as u32
    )))
}

/// Extract the local peer UUID from the contents of `glusterd.info`:
///
/// ```text
/// UUID=30602134-698f-4e53-8503-163e175aea85
/// operating-version=30800
/// ```
pub fn local_uuid_from_info(contents: &str) -> Result<Uuid> {
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "UUID" {
                return Uuid::parse_str(value.trim())
                    .map_err(|e| Error::Parse(format!("invalid UUID {:?}: {}", value.trim(), e)));
            }
        }
    }
    Err(Error::Parse("Unable to find UUID".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::cell::Cell;

    fn peer(state: State) -> Peer {
        Peer::new(Some(Uuid::new_v4()), "10.0.0.1", Some(state))
    }

    #[test]
    fn test_parse_state() {
        assert_eq!("Connected".parse::<State>().unwrap(), State::Connected);
        assert_eq!(
            "PEER IN CLUSTER".parse::<State>().unwrap(),
            State::PeerInCluster
        );
        assert_eq!(
            "accepted peer in cluster".parse::<State>().unwrap(),
            State::AcceptedPeerRequest
        );
        for state in State::ALL.iter().filter(|s| **s != State::Unknown) {
            assert_eq!(state.to_string().parse::<State>().unwrap(), *state);
        }
    }

    #[test]
    fn test_parse_state_no_fuzzy_match() {
        assert!("connect".parse::<State>().is_err());
        assert!("connected ".parse::<State>().is_err());
        assert!("".parse::<State>().is_err());
        assert!(matches!(
            "bogus".parse::<State>(),
            Err(Error::ParseState(s)) if s == "bogus"
        ));
    }

    #[test]
    fn test_peer_equality_by_uuid() {
        let id = Uuid::new_v4();
        let a = Peer::new(Some(id), "10.0.0.1", Some(State::Connected));
        let b = Peer::new(Some(id), "10.0.0.2", Some(State::Disconnected));
        assert_eq!(a, b);
        assert_ne!(a, Peer::new(Some(Uuid::new_v4()), "10.0.0.1", None));
    }

    #[test]
    fn test_strict_readiness() {
        let mut peers = vec![peer(State::Connected), peer(State::Connected)];
        assert!(is_ready(&peers));
        peers.push(peer(State::PeerInCluster));
        assert!(!is_ready(&peers));
        assert!(!is_ready(&[Peer::with_address("10.0.0.9")]));
        assert!(is_ready(&[]));
    }

    #[test]
    fn test_wait_for_ready_eventually() {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let polls = Cell::new(0);
        wait_for_ready(
            || {
                polls.set(polls.get() + 1);
                let state = if polls.get() < 4 {
                    State::PeerInCluster
                } else {
                    State::Connected
                };
                Ok(vec![peer(State::Connected), peer(state)])
            },
            &clock,
            ReadyPolicy::default(),
        )
        .unwrap();
        assert_eq!(polls.get(), 4);
        assert_eq!(clock.slept(), Duration::from_secs(3));
    }

    #[test]
    fn test_wait_for_ready_times_out() {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let polls = Cell::new(0);
        let result = wait_for_ready(
            || {
                polls.set(polls.get() + 1);
                Ok(vec![peer(State::PeerInCluster)])
            },
            &clock,
            ReadyPolicy::default(),
        );
        assert!(matches!(result, Err(Error::CoordinationTimeout(_))));
        assert_eq!(polls.get(), 600);
        assert_eq!(clock.slept(), Duration::from_secs(600));
    }

    #[test]
    fn test_wait_for_ready_propagates_poll_errors() {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let result = wait_for_ready(
            || Err(Error::Other("glusterd down".into())),
            &clock,
            ReadyPolicy::default(),
        );
        assert!(matches!(result, Err(Error::Other(_))));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_local_uuid_from_info() {
        let info = "UUID=30602134-698f-4e53-8503-163e175aea85\noperating-version=30800\n";
        assert_eq!(
            local_uuid_from_info(info).unwrap().to_string(),
            "30602134-698f-4e53-8503-163e175aea85"
        );
        assert!(local_uuid_from_info("operating-version=30800").is_err());
        assert!(local_uuid_from_info("UUID=nope").is_err());
    }
}
