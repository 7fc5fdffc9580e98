//! brickwork command line

use anyhow::Context;
use brickwork::cluster::cli::parse_volume_info;
use brickwork::cluster::peer::local_uuid_from_info;
use brickwork::cluster::{BitrotOption, ScrubControl, Toggle};
use brickwork::common::{
    is_upgrade, parse_duration, Config, SystemClock, SystemRunner, VolumeSettings,
};
use brickwork::coordinator::{
    FileMarkerStore, JsonPeerSource, PeerInfoSource, Plan, RolloutCoordinator, ShrinkOutcome,
    VolumeLifecycle,
};
use brickwork::ops::{
    check_for_upgrade, create_quota, delete_quota, ensure_volume, list_quotas,
    parse_option_pairs, AptUpgrader,
};
use brickwork::storage::{initialize_devices, BrickDevice, Filesystem};
use brickwork::{wait_for_ready, ClusterCli, GlusterCli, ReadyPolicy};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "brickwork")]
#[command(about = "Gluster topology planner and rolling upgrade coordinator")]
#[command(version)]
struct Cli {
    /// TOML config file (BRICKWORK_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Volume to act on instead of the configured `volume_name`
    #[arg(long, global = true)]
    volume: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the brick placement without touching the cluster
    Plan {
        /// JSON array of {peer_id, address, bricks}
        #[arg(long)]
        peers: PathBuf,

        /// Saved `gluster volume info` output, for a differential plan
        #[arg(long)]
        volume_info: Option<PathBuf>,
    },

    /// Create, start and configure the volume, or expand it if it exists
    Ensure {
        #[arg(long)]
        peers: PathBuf,
    },

    /// Add bricks from peers that do not serve the volume yet
    Expand {
        #[arg(long)]
        peers: PathBuf,
    },

    /// Remove the bricks of a departing peer
    Shrink {
        #[arg(long)]
        peers: PathBuf,

        /// peer_id of the departing peer
        #[arg(long)]
        peer: String,
    },

    /// Block until every peer is Connected
    WaitReady {
        /// Pause between polls, e.g. "1s" or "500ms"
        #[arg(long, default_value = "1s")]
        interval: String,

        /// Give up after this many polls
        #[arg(long, default_value = "600")]
        max_iterations: usize,
    },

    /// Format and mount brick devices, printing the usable mount paths
    Format {
        /// Device paths, e.g. /dev/vdb
        #[arg(required = true)]
        devices: Vec<String>,

        /// Devices that are already formatted and mounted
        #[arg(long, value_delimiter = ',')]
        initialized: Vec<String>,
    },

    /// Start rebalancing the volume across its bricks
    Rebalance,

    /// Control bitrot detection and scrubbing
    Bitrot {
        #[command(subcommand)]
        action: BitrotAction,
    },

    /// Manage directory quotas
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },

    /// Set volume options in one call, e.g. `nfs.disable=off`
    SetOptions {
        #[arg(required = true)]
        options: Vec<String>,
    },

    /// Upgrade glusterfs in turn with the other peers
    Upgrade,

    /// Would `candidate` be an upgrade over `installed`?
    VersionCompare { candidate: String, installed: String },
}

#[derive(Subcommand)]
enum BitrotAction {
    Enable,
    Disable,
    /// Pause the scrubber
    Pause,
    /// Resume a paused scrubber
    Resume,
    /// hourly, daily, weekly, biweekly or monthly
    Frequency { frequency: String },
    /// lazy, normal or aggressive
    Throttle { throttle: String },
}

#[derive(Subcommand)]
enum QuotaAction {
    /// Limit a directory, enabling quotas on the volume if needed
    Create {
        path: String,
        /// Hard limit in bytes
        usage_limit: u64,
    },
    /// Remove the limit on a directory
    Delete { path: String },
    /// Print configured limits
    List,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = VolumeSettings::from_source(&config);
    if let Some(volume) = cli.volume {
        settings.volume_name = volume;
    }
    let gluster = GlusterCli::new(SystemRunner);
    let clock = SystemClock;

    match cli.command {
        Commands::Plan { peers, volume_info } => {
            let peers = JsonPeerSource::new(&peers).peers()?;
            let volume = match volume_info {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    parse_volume_info(&raw)?
                }
                None => None,
            };
            let lifecycle = VolumeLifecycle::new(&gluster, &clock, settings);
            match lifecycle.plan(&peers, volume.as_ref()) {
                Plan::WaitForMorePeers { needed, available } => {
                    println!("Waiting for more peers: {} of {} available", available, needed);
                }
                Plan::Bricks(placement) => {
                    println!("{}", serde_json::to_string_pretty(&placement)?);
                }
            }
        }

        Commands::Ensure { peers } => {
            let peers = JsonPeerSource::new(&peers).peers()?;
            let lifecycle = VolumeLifecycle::new(&gluster, &clock, settings);
            let report = ensure_volume(&lifecycle, &peers, config.bitrot_detection)?;
            println!("Volume report:");
            println!("  Volume: {}", report.volume);
            println!("  Status: {}", report.status);
            println!("  Started: {}", report.started);
            println!("  Options applied: {}", report.options_applied);
            if let Some(error) = &report.options_error {
                println!("  Options failed: {}", error);
            }
            println!("  Bitrot detection: {}", report.bitrot);
            if let Some(error) = &report.bitrot_error {
                println!("  Bitrot failed: {}", error);
            }
        }

        Commands::Expand { peers } => {
            let peers = JsonPeerSource::new(&peers).peers()?;
            let volume = gluster
                .volume_info(&settings.volume_name)?
                .with_context(|| format!("volume {} does not exist", settings.volume_name))?;
            let lifecycle = VolumeLifecycle::new(&gluster, &clock, settings);
            println!("{}", lifecycle.expand_volume(&peers, &volume)?);
        }

        Commands::Shrink { peers, peer } => {
            let peers = JsonPeerSource::new(&peers).peers()?;
            let departing = peers
                .iter()
                .find(|entry| entry.peer_id == peer)
                .with_context(|| format!("peer {} is not in the peer list", peer))?;
            let volume = gluster
                .volume_info(&settings.volume_name)?
                .with_context(|| format!("volume {} does not exist", settings.volume_name))?;
            let lifecycle = VolumeLifecycle::new(&gluster, &clock, settings);
            match lifecycle.shrink_volume(departing, &volume)? {
                ShrinkOutcome::Removed(bricks) => {
                    for brick in bricks {
                        println!("removed {}", brick);
                    }
                }
                ShrinkOutcome::NothingToRemove => println!("nothing to remove"),
                ShrinkOutcome::WaitForMorePeers => println!("waiting for more peers"),
            }
        }

        Commands::WaitReady {
            interval,
            max_iterations,
        } => {
            let policy = ReadyPolicy {
                interval: parse_duration(&interval)?,
                max_iterations,
            };
            wait_for_ready(|| gluster.peer_status(), &clock, policy)?;
            println!("all peers connected");
        }

        Commands::Format {
            devices,
            initialized,
        } => {
            let fs: Filesystem = config.filesystem_type.parse()?;
            let devices: Vec<BrickDevice> = devices
                .into_iter()
                .map(|dev| {
                    let done = initialized.contains(&dev);
                    BrickDevice::new(dev, done)
                })
                .collect();
            for mount in initialize_devices(&devices, &fs, &SystemRunner) {
                println!("{}", mount);
            }
        }

        Commands::Rebalance => {
            gluster.volume_rebalance(&settings.volume_name)?;
            println!("rebalance of {} started", settings.volume_name);
        }

        Commands::Bitrot { action } => {
            let name = settings.volume_name.as_str();
            match action {
                BitrotAction::Enable => gluster.volume_bitrot(name, Toggle::On)?,
                BitrotAction::Disable => gluster.volume_bitrot(name, Toggle::Off)?,
                BitrotAction::Pause => {
                    gluster.volume_bitrot_option(name, BitrotOption::Scrub(ScrubControl::Pause))?
                }
                BitrotAction::Resume => {
                    gluster.volume_bitrot_option(name, BitrotOption::Scrub(ScrubControl::Resume))?
                }
                BitrotAction::Frequency { frequency } => gluster
                    .volume_bitrot_option(name, BitrotOption::ScrubFrequency(frequency.parse()?))?,
                BitrotAction::Throttle { throttle } => gluster
                    .volume_bitrot_option(name, BitrotOption::ScrubThrottle(throttle.parse()?))?,
            }
        }

        Commands::Quota { action } => {
            let name = settings.volume_name.as_str();
            match action {
                QuotaAction::Create { path, usage_limit } => {
                    create_quota(&gluster, name, &path, usage_limit)?
                }
                QuotaAction::Delete { path } => {
                    if !delete_quota(&gluster, name, &path)? {
                        println!("quotas are not enabled on {}", name);
                    }
                }
                QuotaAction::List => {
                    for quota in list_quotas(&gluster, name)? {
                        println!("{}", quota);
                    }
                }
            }
        }

        Commands::SetOptions { options } => {
            let options = parse_option_pairs(&options)?;
            gluster.volume_set_options(&settings.volume_name, &options)?;
            println!("{} option(s) set on {}", options.len(), settings.volume_name);
        }

        Commands::Upgrade => {
            let info = std::fs::read_to_string(&config.glusterd_info)
                .with_context(|| format!("reading {}", config.glusterd_info.display()))?;
            let local = local_uuid_from_info(&info)?;
            let peers = gluster.pool_list()?;
            let store = FileMarkerStore::open(&config.marker_dir)?;
            let upgrader = AptUpgrader::new(SystemRunner);
            let mut rollout = RolloutCoordinator::new(&store, &clock, &upgrader);

            let report = check_for_upgrade(&mut rollout, local, &peers)?;
            println!("Upgrade report:");
            println!("  Installed: {}", report.installed);
            println!(
                "  Candidate: {}",
                report.candidate.as_deref().unwrap_or("(none)")
            );
            match report.rollout {
                Some(rollout) => {
                    println!("  Position: {}", rollout.position);
                    println!("  Polls: {}", rollout.polls);
                    println!("  Waited: {:?}", rollout.waited);
                    println!("  State: {:?}", rollout.state());
                }
                None => println!("  Skipped: candidate is not newer"),
            }
        }

        Commands::VersionCompare {
            candidate,
            installed,
        } => {
            println!("{}", is_upgrade(&candidate, &installed));
        }
    }

    Ok(())
}
