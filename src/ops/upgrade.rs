//! Rolling package upgrades

use crate::cluster::peer::Peer;
use crate::common::{is_upgrade, CommandRunner, Error, Result};
use crate::coordinator::markers::MarkerStore;
use crate::coordinator::rollout::{RolloutCoordinator, RolloutReport, Upgrader};
use serde::Serialize;
use uuid::Uuid;

/// Packages replaced during an upgrade.
pub const GLUSTER_PACKAGES: [&str; 3] = ["glusterfs-server", "glusterfs-common", "glusterfs-client"];
/// Service restarted around the package install.
pub const GLUSTER_SERVICE: &str = "glusterfs-server";

/// Roll the cluster to the candidate version if it is newer.
///
/// A no-op when there is no candidate or the candidate is not strictly
/// greater than the installed version.
pub fn check_for_upgrade<S: MarkerStore, U: Upgrader>(
    rollout: &mut RolloutCoordinator<'_, S, U>,
    local: Uuid,
    peers: &[Peer],
) -> Result<UpgradeReport> {
    let installed = rollout.upgrader().installed_version()?;
    let candidate = rollout.upgrader().candidate_version()?;
    let mut report = UpgradeReport {
        installed: installed.clone(),
        candidate: candidate.clone(),
        rollout: None,
    };

    let Some(candidate) = candidate else {
        tracing::info!("No candidate version available, nothing to upgrade");
        return Ok(report);
    };
    if !is_upgrade(&candidate, &installed) {
        tracing::info!(
            "Candidate {} is not newer than installed {}, skipping upgrade",
            candidate,
            installed
        );
        return Ok(report);
    }

    tracing::info!("Rolling cluster from {} to {}", installed, candidate);
    report.rollout = Some(rollout.roll(local, peers, &candidate)?);
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub installed: String,
    pub candidate: Option<String>,
    /// `None` when the version gate did not hold
    pub rollout: Option<RolloutReport>,
}

/// Upgrades glusterfs with apt and systemd.
pub struct AptUpgrader<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> AptUpgrader<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(program, &args)
    }
}

impl<R: CommandRunner> Upgrader for AptUpgrader<R> {
    fn installed_version(&self) -> Result<String> {
        let out = self.run("dpkg-query", &["-W", "-f=${Version}", GLUSTER_SERVICE])?;
        let version = out.trim();
        if version.is_empty() {
            return Err(Error::Parse(format!("{} is not installed", GLUSTER_SERVICE)));
        }
        Ok(version.to_string())
    }

    fn candidate_version(&self) -> Result<Option<String>> {
        let out = self.run("apt-cache", &["policy", GLUSTER_SERVICE])?;
        Ok(parse_candidate(&out))
    }

    fn upgrade(&self, version: &str) -> Result<()> {
        tracing::info!("Upgrading to: {}", version);
        self.run("systemctl", &["stop", GLUSTER_SERVICE])?;
        let mut args = vec!["install", "-y"];
        args.extend(GLUSTER_PACKAGES);
        self.run("apt-get", &args)?;
        self.run("systemctl", &["start", GLUSTER_SERVICE])?;
        Ok(())
    }
}

/// The `Candidate:` line of `apt-cache policy`, `None` for `(none)`.
fn parse_candidate(policy: &str) -> Option<String> {
    policy
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Candidate:"))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .filter(|v| *v != "(none)")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordingRunner;

    const POLICY: &str = "glusterfs-server:\n\
        \x20 Installed: 3.8.15-ubuntu1~xenial1\n\
        \x20 Candidate: 3.10.12-ubuntu1~xenial1\n\
        \x20 Version table:\n";

    #[test]
    fn test_parse_candidate() {
        assert_eq!(
            parse_candidate(POLICY).as_deref(),
            Some("3.10.12-ubuntu1~xenial1")
        );
        assert_eq!(parse_candidate("  Candidate: (none)\n"), None);
        assert_eq!(parse_candidate(""), None);
    }

    #[test]
    fn test_apt_upgrader_commands() {
        let runner = RecordingRunner::new();
        runner.respond(Ok("3.8.15-ubuntu1~xenial1".into()));
        runner.respond(Ok(POLICY.into()));
        let upgrader = AptUpgrader::new(runner);

        assert_eq!(upgrader.installed_version().unwrap(), "3.8.15-ubuntu1~xenial1");
        assert_eq!(
            upgrader.candidate_version().unwrap().as_deref(),
            Some("3.10.12-ubuntu1~xenial1")
        );
        upgrader.upgrade("3.10.12-ubuntu1~xenial1").unwrap();
        assert_eq!(
            upgrader.runner().calls()[2..],
            [
                "systemctl stop glusterfs-server",
                "apt-get install -y glusterfs-server glusterfs-common glusterfs-client",
                "systemctl start glusterfs-server",
            ]
        );
    }

    #[test]
    fn test_not_installed() {
        let upgrader = AptUpgrader::new(RecordingRunner::new());
        assert!(matches!(upgrader.installed_version(), Err(Error::Parse(_))));
    }
}
