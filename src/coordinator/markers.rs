//! Rollout markers
//!
//! A marker is a write-once timestamp under a key derived from
//! `(peer uuid, version, phase)`. Markers are the only signal peers exchange
//! during a rollout. Each peer writes only keys carrying its own UUID, so
//! keys never collide across peers.

use crate::common::{from_unix_seconds, to_unix_seconds, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Start,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Start => "start",
            Phase::Done => "done",
        })
    }
}

/// Renders as `{uuid}_{version}_{phase}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerKey {
    pub peer: Uuid,
    pub version: String,
    pub phase: Phase,
}

impl MarkerKey {
    pub fn new(peer: Uuid, version: impl Into<String>, phase: Phase) -> Self {
        Self {
            peer,
            version: version.into(),
            phase,
        }
    }

    pub fn start(peer: Uuid, version: &str) -> Self {
        Self::new(peer, version, Phase::Start)
    }

    pub fn done(peer: Uuid, version: &str) -> Self {
        Self::new(peer, version, Phase::Done)
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.peer, self.version, self.phase)
    }
}

/// Durable key to timestamp store with create-once writes.
pub trait MarkerStore {
    fn exists(&self, key: &MarkerKey) -> Result<bool>;
    fn read(&self, key: &MarkerKey) -> Result<Option<DateTime<Utc>>>;
    /// Store `ts` under `key` unless the key is already present. Returns
    /// whether this call created it. An existing value is never replaced.
    fn create_if_absent(&self, key: &MarkerKey, ts: DateTime<Utc>) -> Result<bool>;
}

/// One file per marker under a directory on the cluster mount. The file
/// holds the timestamp as JSON seconds since the epoch.
pub struct FileMarkerStore {
    root: PathBuf,
}

impl FileMarkerStore {
    /// Creates `root` if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &MarkerKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    /// Unique per call, hidden, and never a valid key.
    fn staging_path(&self, key: &MarkerKey) -> PathBuf {
        self.root.join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()))
    }
}

impl MarkerStore for FileMarkerStore {
    fn exists(&self, key: &MarkerKey) -> Result<bool> {
        Ok(self.path(key).exists())
    }

    /// A marker that cannot be decoded reads as `None` even though
    /// [`exists`](MarkerStore::exists) reports it.
    fn read(&self, key: &MarkerKey) -> Result<Option<DateTime<Utc>>> {
        let raw = match std::fs::read_to_string(self.path(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let ts = serde_json::from_str::<f64>(raw.trim())
            .ok()
            .and_then(from_unix_seconds);
        if ts.is_none() {
            tracing::warn!("Ignoring unreadable marker {}: {:?}", key, raw);
        }
        Ok(ts)
    }

    /// The body is written and synced under a temporary name, then hard
    /// linked onto the key. The key never exists without its timestamp, and
    /// the link fails with `AlreadyExists` if another writer got there first.
    fn create_if_absent(&self, key: &MarkerKey, ts: DateTime<Utc>) -> Result<bool> {
        let staging = self.staging_path(key);
        let body = serde_json::to_string(&to_unix_seconds(ts))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)?;
        let published = file
            .write_all(body.as_bytes())
            .and_then(|()| file.sync_all())
            .and_then(|()| std::fs::hard_link(&staging, self.path(key)));
        drop(file);
        if let Err(e) = std::fs::remove_file(&staging) {
            tracing::warn!("Failed to remove staging file {}: {}", staging.display(), e);
        }

        match published {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!("Marker {} already present", key);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemMarkerStore {
    map: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of markers written so far.
    pub fn len(&self) -> usize {
        self.map.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MarkerStore for MemMarkerStore {
    fn exists(&self, key: &MarkerKey) -> Result<bool> {
        Ok(self.read(key)?.is_some())
    }

    fn read(&self, key: &MarkerKey) -> Result<Option<DateTime<Utc>>> {
        let map = self
            .map
            .lock()
            .map_err(|_| Error::Marker("marker map poisoned".into()))?;
        Ok(map.get(&key.to_string()).copied())
    }

    fn create_if_absent(&self, key: &MarkerKey, ts: DateTime<Utc>) -> Result<bool> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| Error::Marker("marker map poisoned".into()))?;
        if map.contains_key(&key.to_string()) {
            return Ok(false);
        }
        map.insert(key.to_string(), ts);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_key_format() {
        let id = Uuid::parse_str("30602134-698f-4e53-8503-163e175aea85").unwrap();
        assert_eq!(
            MarkerKey::start(id, "3.10.0").to_string(),
            "30602134-698f-4e53-8503-163e175aea85_3.10.0_start"
        );
        assert_eq!(
            MarkerKey::done(id, "3.10.0").to_string(),
            "30602134-698f-4e53-8503-163e175aea85_3.10.0_done"
        );
    }

    #[test]
    fn test_mem_store_create_once() {
        let store = MemMarkerStore::new();
        let key = MarkerKey::done(Uuid::new_v4(), "3.10.0");
        assert!(!store.exists(&key).unwrap());
        assert!(store.create_if_absent(&key, ts(100)).unwrap());
        assert!(!store.create_if_absent(&key, ts(200)).unwrap());
        assert_eq!(store.read(&key).unwrap(), Some(ts(100)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_create_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMarkerStore::open(dir.path().join(".upgrade")).unwrap();
        let key = MarkerKey::done(Uuid::new_v4(), "3.10.0");

        assert_eq!(store.read(&key).unwrap(), None);
        assert!(store.create_if_absent(&key, ts(1_700_000_000)).unwrap());
        assert!(!store.create_if_absent(&key, ts(1_700_000_500)).unwrap());
        assert!(store.exists(&key).unwrap());
        assert_eq!(store.read(&key).unwrap(), Some(ts(1_700_000_000)));
    }

    #[test]
    fn test_file_store_unreadable_marker_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMarkerStore::open(dir.path()).unwrap();
        let key = MarkerKey::start(Uuid::new_v4(), "3.10.0");
        std::fs::write(dir.path().join(key.to_string()), "not a number").unwrap();
        assert_eq!(store.read(&key).unwrap(), None);
        assert!(store.exists(&key).unwrap());
    }

    #[test]
    fn test_file_store_leaves_only_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMarkerStore::open(dir.path()).unwrap();
        let key = MarkerKey::start(Uuid::new_v4(), "3.10.0");

        assert!(store.create_if_absent(&key, ts(1_700_000_000)).unwrap());
        assert!(!store.create_if_absent(&key, ts(1_700_000_100)).unwrap());

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![key.to_string()]);
        let body = std::fs::read_to_string(dir.path().join(key.to_string())).unwrap();
        assert_eq!(body, "1700000000.0");
    }

    #[test]
    fn test_file_store_does_not_replace_a_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMarkerStore::open(dir.path()).unwrap();
        let key = MarkerKey::start(Uuid::new_v4(), "3.10.0");
        std::fs::write(dir.path().join(key.to_string()), "").unwrap();

        assert!(!store.create_if_absent(&key, ts(1_700_000_000)).unwrap());
        let body = std::fs::read_to_string(dir.path().join(key.to_string())).unwrap();
        assert!(body.is_empty());
    }
}
