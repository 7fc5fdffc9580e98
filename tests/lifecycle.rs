//! Volume lifecycle tests for brickwork against a recorded gluster CLI

use brickwork::cluster::{is_ready, GlusterCli, Peer, ReadyPolicy, State, Status, VolumeType};
use brickwork::common::{Error, ManualClock, RecordingRunner, VolumeSettings};
use brickwork::coordinator::{PeerEntry, ShrinkOutcome, VolumeLifecycle};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const NOT_READY: &str = "Number of Peers: 2\n\n\
    Hostname: 10.0.0.2\n\
    Uuid: 5ac3c47b-5c3c-4d5a-9b0f-1a3c1f9f7c2e\n\
    State: Peer in Cluster (Connected)\n\n\
    Hostname: 10.0.0.3\n\
    Uuid: 7d1c5e2a-0b8f-4f34-9a55-2c3e4d5f6a7b\n\
    State: Accepted peer in cluster\n";

const READY: &str = "Number of Peers: 2\n\n\
    Hostname: 10.0.0.2\n\
    Uuid: 5ac3c47b-5c3c-4d5a-9b0f-1a3c1f9f7c2e\n\
    State: Peer in Cluster (Connected)\n\n\
    Hostname: 10.0.0.3\n\
    Uuid: 7d1c5e2a-0b8f-4f34-9a55-2c3e4d5f6a7b\n\
    State: Peer in Cluster (Connected)\n";

fn clock() -> ManualClock {
    ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
}

fn peers(n: usize, devices: &[&str]) -> Vec<PeerEntry> {
    (1..=n)
        .map(|i| PeerEntry::new(format!("g{}", i), format!("10.0.0.{}", i), devices))
        .collect()
}

fn settings(pairs: &[(&str, &str)]) -> VolumeSettings {
    let source: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    VolumeSettings::from_source(&source)
}

#[test]
fn test_strict_readiness() {
    let mut pool: Vec<Peer> = (0..3)
        .map(|_| Peer::new(Some(Uuid::new_v4()), "10.0.0.1", Some(State::Connected)))
        .collect();
    assert!(is_ready(&pool));
    pool[1].status = Some(State::PeerInCluster);
    assert!(!is_ready(&pool));
}

#[test]
fn test_create_blocks_until_connected() {
    let runner = RecordingRunner::new();
    runner.respond(Ok(NOT_READY.into()));
    runner.respond(Ok(NOT_READY.into()));
    runner.respond(Ok(READY.into()));
    let cli = GlusterCli::new(runner);
    let clock = clock();
    let lifecycle = VolumeLifecycle::new(&cli, &clock, settings(&[]));

    let status = lifecycle.create_volume(&peers(3, &["/mnt/vdb1"])).unwrap();
    assert_eq!(status, Status::Created);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 2]);
    assert_eq!(cli.runner().calls().len(), 4);
}

#[test]
fn test_create_readiness_timeout_is_an_error() {
    let runner = RecordingRunner::new();
    for _ in 0..5 {
        runner.respond(Ok(NOT_READY.into()));
    }
    let cli = GlusterCli::new(runner);
    let clock = clock();
    let lifecycle = VolumeLifecycle::new(&cli, &clock, settings(&[])).with_ready_policy(
        ReadyPolicy {
            interval: Duration::from_secs(1),
            max_iterations: 5,
        },
    );

    let result = lifecycle.create_volume(&peers(3, &["/mnt/vdb1"]));
    assert!(matches!(result, Err(Error::CoordinationTimeout(_))));
    assert_eq!(cli.runner().calls().len(), 5);
}

#[test]
fn test_create_argument_shape_per_volume_type() {
    let cases = [
        ("distribute", "3", "1", "volume create test transport tcp"),
        ("stripe", "3", "1", "volume create test stripe 3 transport tcp"),
        ("arbiter", "3", "1", "volume create test replica 3 arbiter 1 transport tcp"),
        (
            "striped-replicate",
            "3",
            "2",
            "volume create test stripe 2 replica 3 transport tcp",
        ),
        (
            "disperse",
            "3",
            "1",
            "volume create test disperse 3 redundancy 1 transport tcp",
        ),
    ];

    for (cluster_type, replication, extra, expected) in cases {
        let cli = GlusterCli::new(RecordingRunner::new());
        let clock = clock();
        let lifecycle = VolumeLifecycle::new(
            &cli,
            &clock,
            settings(&[
                ("cluster_type", cluster_type),
                ("replication_level", replication),
                ("extra_level", extra),
            ]),
        );
        assert_eq!(
            lifecycle.create_volume(&peers(3, &["/mnt/vdb1"])).unwrap(),
            Status::Created,
            "{}",
            cluster_type
        );
        let calls = cli.runner().calls();
        assert!(
            calls[1].starts_with(&format!("gluster --mode=script {}", expected)),
            "{}: {}",
            cluster_type,
            calls[1]
        );
        assert!(calls[1].ends_with(" force"));
    }
}

#[test]
fn test_expand_without_devices_is_invalid_config() {
    let cli = GlusterCli::new(RecordingRunner::new());
    let clock = clock();
    let lifecycle = VolumeLifecycle::new(&cli, &clock, settings(&[("replication_level", "1")]));
    let volume = brickwork::cluster::Volume::new("test", VolumeType::Replicate);

    let status = lifecycle.expand_volume(&peers(2, &[]), &volume).unwrap();
    assert_eq!(status, Status::InvalidConfig);
    assert!(cli.runner().calls().is_empty());
}

#[test]
fn test_expand_add_brick_failure_propagates() {
    let runner = RecordingRunner::new();
    runner.respond(Err(Error::CommandFailed {
        command: "gluster volume add-brick".into(),
        reason: "brick is already part of a volume".into(),
    }));
    let cli = GlusterCli::new(runner);
    let clock = clock();
    let lifecycle = VolumeLifecycle::new(&cli, &clock, settings(&[]));
    let volume = brickwork::cluster::Volume::new("test", VolumeType::Replicate);

    let result = lifecycle.expand_volume(&peers(3, &["/mnt/vdb1"]), &volume);
    assert!(matches!(result, Err(Error::CommandFailed { .. })));
}

#[test]
fn test_shrink_peer_outside_volume_with_single_replica() {
    let cli = GlusterCli::new(RecordingRunner::new());
    let clock = clock();
    let lifecycle = VolumeLifecycle::new(&cli, &clock, settings(&[("replication_level", "1")]));
    let volume = brickwork::cluster::Volume::new("test", VolumeType::Distribute);
    let departing = PeerEntry::new("g9", "10.0.0.9", &["/mnt/vdb1"]);

    let outcome = lifecycle.shrink_volume(&departing, &volume).unwrap();
    match outcome {
        ShrinkOutcome::Removed(bricks) => assert_eq!(bricks[0].to_string(), "10.0.0.9:/mnt/vdb1"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        cli.runner().calls(),
        vec!["gluster --mode=script volume remove-brick test 10.0.0.9:/mnt/vdb1 force"]
    );
}
