//! Bring the managed volume to its desired shape

use crate::cluster::cli::ClusterCli;
use crate::cluster::features::FAVORITE_CHILD_POLICY;
use crate::cluster::volume::{default_volume_options, Status, Toggle};
use crate::common::Result;
use crate::coordinator::lifecycle::VolumeLifecycle;
use crate::coordinator::placement::PeerEntry;
use serde::Serialize;

/// Create or expand the volume, depending on whether it exists.
///
/// The volume is looked up fresh. A new volume is started after creation,
/// then the default options (plus the split-brain policy, if configured) are
/// applied and bitrot detection is turned on when `bitrot` is set. Once the
/// volume is started, option and bitrot failures are logged and recorded in
/// the report instead of being returned. An existing volume is expanded with
/// any new peers.
pub fn ensure_volume<C: ClusterCli>(
    lifecycle: &VolumeLifecycle<'_, C>,
    peers: &[PeerEntry],
    bitrot: bool,
) -> Result<VolumeReport> {
    let cli = lifecycle.cli();
    let name = lifecycle.settings().volume_name.clone();
    let mut report = VolumeReport {
        volume: name.clone(),
        existed: false,
        status: Status::WaitForMorePeers,
        started: false,
        options_applied: 0,
        options_error: None,
        bitrot: false,
        bitrot_error: None,
    };

    if let Some(volume) = cli.volume_info(&name)? {
        tracing::info!("Volume {} exists, checking for expansion", name);
        report.existed = true;
        report.status = lifecycle.expand_volume(peers, &volume)?;
        return Ok(report);
    }

    report.status = lifecycle.create_volume(peers)?;
    if report.status != Status::Created {
        return Ok(report);
    }

    match cli.volume_start(&name, false) {
        Ok(()) => {
            tracing::info!("Starting volume {} succeeded", name);
            report.started = true;
        }
        Err(e) => {
            tracing::error!("Start volume failed with output: {}", e);
            report.status = Status::FailedToStart;
            return Ok(report);
        }
    }

    let mut options = default_volume_options();
    if let Some(policy) = lifecycle.settings().splitbrain_policy {
        tracing::debug!("Setting split brain policy to: {}", policy);
        options.insert(FAVORITE_CHILD_POLICY.to_string(), policy.to_string());
    }
    match cli.volume_set_options(&name, &options) {
        Ok(()) => report.options_applied = options.len(),
        Err(e) => {
            tracing::error!("Setting volume options failed with error(s): {}", e);
            report.options_error = Some(e.to_string());
        }
    }

    if bitrot {
        tracing::info!("Enabling bitrot detection on {}", name);
        match cli.volume_bitrot(&name, Toggle::On) {
            Ok(()) => report.bitrot = true,
            Err(e) => {
                tracing::error!("Enabling bitrot failed with error: {}", e);
                report.bitrot_error = Some(e.to_string());
            }
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeReport {
    pub volume: String,
    /// The volume was already present before this run
    pub existed: bool,
    pub status: Status,
    pub started: bool,
    pub options_applied: usize,
    pub options_error: Option<String>,
    pub bitrot: bool,
    pub bitrot_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::cli::GlusterCli;
    use crate::cluster::features::SplitBrainPolicy;
    use crate::cluster::volume::VolumeType;
    use crate::common::{Error, ManualClock, RecordingRunner, VolumeSettings};
    use chrono::{TimeZone, Utc};

    const EXISTING: &str = "Volume Name: test\n\
        Type: Replicate\n\
        Status: Started\n\
        Number of Bricks: 1 x 3 = 3\n\
        Transport-type: tcp\n\
        Bricks:\n\
        Brick1: 10.0.0.1:/mnt/vdb1\n\
        Brick2: 10.0.0.2:/mnt/vdb1\n\
        Brick3: 10.0.0.3:/mnt/vdb1\n";

    fn settings() -> VolumeSettings {
        VolumeSettings {
            volume_name: "test".into(),
            cluster_type: VolumeType::Replicate,
            replicas: 3,
            extra: 1,
            splitbrain_policy: None,
        }
    }

    fn peers(addresses: &[&str]) -> Vec<PeerEntry> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, a)| PeerEntry::new(format!("g{}", i), *a, &["/mnt/vdb1"]))
            .collect()
    }

    fn missing() -> Result<String> {
        Err(Error::CommandFailed {
            command: "gluster volume info test".into(),
            reason: "Volume test does not exist".into(),
        })
    }

    #[test]
    fn test_new_volume_is_created_started_and_configured() {
        let runner = RecordingRunner::new();
        runner.respond(missing());
        let cli = GlusterCli::new(runner);
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let lifecycle = VolumeLifecycle::new(&cli, &clock, settings());

        let report =
            ensure_volume(&lifecycle, &peers(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), true)
                .unwrap();
        assert_eq!(report.status, Status::Created);
        assert!(!report.existed);
        assert!(report.started);
        assert!(report.bitrot);
        assert_eq!(report.options_applied, default_volume_options().len());

        let calls = cli.runner().calls();
        assert!(calls[2].contains("volume create test replica 3"));
        assert_eq!(calls[3], "gluster --mode=script volume start test");
        assert_eq!(
            calls.last().unwrap(),
            "gluster --mode=script volume bitrot test enable"
        );
    }

    #[test]
    fn test_start_failure() {
        let runner = RecordingRunner::new();
        runner.respond(missing());
        runner.respond(Ok(String::new()));
        runner.respond(Ok(String::new()));
        runner.respond(Err(Error::CommandFailed {
            command: "gluster volume start test".into(),
            reason: "brick not connected".into(),
        }));
        let cli = GlusterCli::new(runner);
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let lifecycle = VolumeLifecycle::new(&cli, &clock, settings());

        let report =
            ensure_volume(&lifecycle, &peers(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), false)
                .unwrap();
        assert_eq!(report.status, Status::FailedToStart);
        assert_eq!(report.options_applied, 0);
        assert_eq!(cli.runner().calls().len(), 4);
    }

    #[test]
    fn test_existing_volume_is_expanded() {
        let runner = RecordingRunner::new();
        runner.respond(Ok(EXISTING.to_string()));
        let cli = GlusterCli::new(runner);
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let lifecycle = VolumeLifecycle::new(&cli, &clock, settings());

        let all = peers(&[
            "10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5", "10.0.0.6",
        ]);
        let report = ensure_volume(&lifecycle, &all, false).unwrap();
        assert!(report.existed);
        assert_eq!(report.status, Status::Expanded);
        assert_eq!(
            cli.runner().calls()[1],
            "gluster --mode=script volume add-brick test \
             10.0.0.4:/mnt/vdb1 10.0.0.5:/mnt/vdb1 10.0.0.6:/mnt/vdb1 force"
        );
    }

    #[test]
    fn test_option_and_bitrot_failures_keep_the_report() {
        let runner = RecordingRunner::new();
        runner.respond(missing());
        runner.respond(Ok(String::new()));
        runner.respond(Ok(String::new()));
        runner.respond(Ok(String::new()));
        runner.respond(Err(Error::CommandFailed {
            command: "gluster volume set".into(),
            reason: "option performance.parallel-readdir does not exist".into(),
        }));
        runner.respond(Err(Error::CommandFailed {
            command: "gluster volume bitrot".into(),
            reason: "bitd is not running".into(),
        }));
        let cli = GlusterCli::new(runner);
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let lifecycle = VolumeLifecycle::new(&cli, &clock, settings());

        let report =
            ensure_volume(&lifecycle, &peers(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), true)
                .unwrap();
        assert_eq!(report.status, Status::Created);
        assert!(report.started);
        assert_eq!(report.options_applied, 0);
        assert!(report.options_error.unwrap().contains("parallel-readdir"));
        assert!(!report.bitrot);
        assert!(report.bitrot_error.is_some());
        assert_eq!(cli.runner().calls().len(), 6);
    }

    #[test]
    fn test_split_brain_policy_joins_the_option_set() {
        let runner = RecordingRunner::new();
        runner.respond(missing());
        let cli = GlusterCli::new(runner);
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let mut with_policy = settings();
        with_policy.splitbrain_policy = Some(SplitBrainPolicy::Majority);
        let lifecycle = VolumeLifecycle::new(&cli, &clock, with_policy);

        let report =
            ensure_volume(&lifecycle, &peers(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), false)
                .unwrap();
        assert_eq!(report.options_applied, default_volume_options().len() + 1);
        let calls = cli.runner().calls();
        let set = calls.last().unwrap();
        assert!(set.starts_with("gluster --mode=script volume set test "));
        assert!(set.contains(" cluster.favorite-child-policy majority "));
        assert!(set.contains(" nfs.disable off "));
    }
}
