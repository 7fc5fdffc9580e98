//! Placement tests for brickwork: round robin, truncation, differential peers

use brickwork::cluster::{Brick, Peer, Volume, VolumeType};
use brickwork::coordinator::{
    find_new_peers, product_assign, select_peers, JsonPeerSource, PeerEntry, PeerInfoSource,
    Placement, Plan,
};
use std::io::Write;

fn entry(id: &str, address: &str, bricks: &[&str]) -> PeerEntry {
    PeerEntry::new(id, address, bricks)
}

fn rendered(placement: &Placement) -> Vec<String> {
    placement.bricks.iter().map(|b| b.to_string()).collect()
}

fn bricks(plan: Plan) -> Placement {
    match plan {
        Plan::Bricks(placement) => placement,
        other => panic!("expected bricks, got {:?}", other),
    }
}

#[test]
fn test_equal_device_round_robin() {
    let peers = vec![entry("a", "A", &["a1", "a2"]), entry("b", "B", &["b1", "b2"])];
    let placement = product_assign(&peers);
    assert_eq!(rendered(&placement), vec!["A:a1", "B:b1", "A:a2", "B:b2"]);
    assert!(placement.discarded.is_empty());
}

#[test]
fn test_unequal_device_truncation() {
    let peers = vec![entry("a", "A", &["a1"]), entry("b", "B", &["b1", "b2"])];
    let placement = product_assign(&peers);
    assert_eq!(rendered(&placement), vec!["A:a1", "B:b1"]);
    assert_eq!(placement.discarded.len(), 1);
    assert_eq!(placement.discarded[0].path, "b2");
}

#[test]
fn test_replica_factor_truncation() {
    let peers: Vec<PeerEntry> = (1..=5)
        .map(|i| entry(&format!("p{}", i), &format!("10.0.0.{}", i), &["/mnt/vdb1"]))
        .collect();
    let placement = bricks(select_peers(&peers, 3, None));
    assert_eq!(
        rendered(&placement),
        vec!["10.0.0.1:/mnt/vdb1", "10.0.0.2:/mnt/vdb1", "10.0.0.3:/mnt/vdb1"]
    );
    assert_eq!(placement.dropped_peers, vec!["p4", "p5"]);
}

#[test]
fn test_order_decides_who_is_dropped() {
    let forward = vec![
        entry("x", "X", &["/b"]),
        entry("y", "Y", &["/b"]),
        entry("z", "Z", &["/b"]),
    ];
    let mut reverse = forward.clone();
    reverse.reverse();

    assert_eq!(bricks(select_peers(&forward, 2, None)).dropped_peers, vec!["z"]);
    assert_eq!(bricks(select_peers(&reverse, 2, None)).dropped_peers, vec!["x"]);
}

#[test]
fn test_exact_replica_count_uses_every_peer() {
    let peers = vec![
        entry("a", "A", &["/b1", "/b2"]),
        entry("b", "B", &["/b1", "/b2"]),
        entry("c", "C", &["/b1", "/b2"]),
    ];
    let placement = bricks(select_peers(&peers, 3, None));
    assert_eq!(placement.bricks.len(), 6);
    assert!(placement.dropped_peers.is_empty());
}

#[test]
fn test_insufficient_peers_waits() {
    let peers = vec![entry("a", "A", &["a1"]), entry("b", "B", &["b1"])];
    assert_eq!(
        select_peers(&peers, 3, None),
        Plan::WaitForMorePeers {
            needed: 3,
            available: 2
        }
    );
}

#[test]
fn test_differential_peer_discovery() {
    let mut volume = Volume::new("test", VolumeType::Replicate);
    volume
        .bricks
        .push(Brick::new(Peer::with_address("H1"), "/mnt/vdb1"));
    let peers = vec![entry("one", "H1", &["/mnt/vdb1"]), entry("two", "H2", &["/mnt/vdb1"])];

    let new_peers = find_new_peers(&peers, &volume);
    assert_eq!(new_peers, vec![entry("two", "H2", &["/mnt/vdb1"])]);

    let placement = bricks(select_peers(&peers, 1, Some(&volume)));
    assert_eq!(rendered(&placement), vec!["H2:/mnt/vdb1"]);
}

#[test]
fn test_differential_applies_replica_rules_to_new_peers() {
    let mut volume = Volume::new("test", VolumeType::Replicate);
    for host in ["H1", "H2", "H3"] {
        volume
            .bricks
            .push(Brick::new(Peer::with_address(host), "/mnt/vdb1"));
    }
    let peers: Vec<PeerEntry> = (1..=5)
        .map(|i| entry(&format!("p{}", i), &format!("H{}", i), &["/mnt/vdb1"]))
        .collect();

    assert_eq!(
        select_peers(&peers, 3, Some(&volume)),
        Plan::WaitForMorePeers {
            needed: 3,
            available: 2
        }
    );
}

#[test]
fn test_json_peer_source_preserves_order() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"peer_id": "glusterfs-2", "address": "10.0.0.3", "bricks": ["/mnt/vdb1"]}},
            {{"peer_id": "glusterfs-0", "address": "10.0.0.1", "bricks": ["/mnt/vdb1", "/mnt/vdc1"]}},
            {{"peer_id": "glusterfs-1", "address": "10.0.0.2"}}
        ]"#
    )
    .unwrap();

    let peers = JsonPeerSource::new(file.path()).peers().unwrap();
    let ids: Vec<&str> = peers.iter().map(|p| p.peer_id.as_str()).collect();
    assert_eq!(ids, vec!["glusterfs-2", "glusterfs-0", "glusterfs-1"]);
    assert_eq!(peers[1].bricks, vec!["/mnt/vdb1", "/mnt/vdc1"]);
    assert!(peers[2].bricks.is_empty());
}
