//! Common utilities and types shared across brickwork

pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{command_line, CommandRunner, RecordingRunner, SystemRunner};
pub use config::{replication_factor, Config, ConfigSource, VolumeSettings};
pub use error::{Error, Result};
pub use utils::{compare_versions, from_unix_seconds, is_upgrade, parse_duration, to_unix_seconds};
