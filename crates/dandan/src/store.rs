//! Persistent global id allocation.
//!
//! External clients cache the ids we hand out indefinitely, so the mapping
//! must be stable across restarts and ids are never reused or recycled, even
//! when the underlying platform content disappears. The store grows
//! monotonically; eviction would break currently-valid mappings and is
//! deliberately absent.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::DandanError;

/// NUL joins the key parts; platform ids never contain it.
const KEY_SEPARATOR: char = '\0';

fn combine_key(platform: &str, season_id: &str, episode_id: &str) -> String {
    let mut key =
        String::with_capacity(platform.len() + season_id.len() + episode_id.len() + 2);
    key.push_str(platform);
    key.push(KEY_SEPARATOR);
    key.push_str(season_id);
    key.push(KEY_SEPARATOR);
    key.push_str(episode_id);
    key
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreState {
    forward: FxHashMap<String, i64>,
    reverse: FxHashMap<i64, String>,
    counter: i64,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            forward: FxHashMap::default(),
            reverse: FxHashMap::default(),
            counter: 1,
        }
    }
}

/// Bidirectional (platform, season id, episode id) ↔ i64 map with a
/// monotonic counter, snapshotted to a gzip-compressed JSON file.
pub struct IdStore {
    inner: RwLock<StoreState>,
    path: PathBuf,
}

impl IdStore {
    /// Fresh store persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(StoreState::default()),
            path: path.into(),
        }
    }

    /// Load the snapshot at `path` if present. A missing, unreadable or
    /// corrupt snapshot yields a fresh store; startup never fails on it.
    pub fn restore(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match Self::load(&path) {
            Ok(Some(state)) => {
                info!(
                    path = %path.display(),
                    entries = state.forward.len(),
                    next_id = state.counter,
                    "id snapshot restored"
                );
                state
            }
            Ok(None) => StoreState::default(),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "id snapshot unreadable, starting fresh"
                );
                StoreState::default()
            }
        };
        Self {
            inner: RwLock::new(state),
            path,
        }
    }

    fn load(path: &Path) -> Result<Option<StoreState>, DandanError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(DandanError::persistence(error.to_string())),
        };
        let decoder = GzDecoder::new(BufReader::new(file));
        let mut state: StoreState = serde_json::from_reader(decoder)
            .map_err(|error| DandanError::persistence(error.to_string()))?;
        if state.counter < 1 {
            state.counter = 1;
        }
        Ok(Some(state))
    }

    /// Map a triple to its global id, allocating on first sight.
    /// `episode_id` may be empty to denote a season/anime-level id.
    pub fn resolve(&self, platform: &str, season_id: &str, episode_id: &str) -> i64 {
        let key = combine_key(platform, season_id, episode_id);

        // Fast path under the shared lock.
        {
            let state = self.inner.read();
            if let Some(id) = state.forward.get(&key) {
                return *id;
            }
        }

        let mut state = self.inner.write();
        // Re-check: another caller may have allocated between the locks.
        if let Some(id) = state.forward.get(&key) {
            return *id;
        }

        let id = state.counter;
        state.counter += 1;
        state.forward.insert(key.clone(), id);
        state.reverse.insert(id, key);
        id
    }

    /// Reverse lookup. `None` for ids this store never allocated.
    pub fn decode(&self, id: i64) -> Option<(String, String, String)> {
        let state = self.inner.read();
        let key = state.reverse.get(&id)?;
        let mut parts = key.split(KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(platform), Some(season), Some(episode), None) => {
                Some((platform.to_owned(), season.to_owned(), episode.to_owned()))
            }
            _ => None,
        }
    }

    /// Write the snapshot. Holds the shared lock for the duration, blocking
    /// new allocations; intended to run once, at graceful shutdown.
    pub fn persist(&self) -> Result<(), DandanError> {
        let state = self.inner.read();
        let file = File::create(&self.path)
            .map_err(|error| DandanError::persistence(error.to_string()))?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, &*state)
            .map_err(|error| DandanError::persistence(error.to_string()))?;
        encoder
            .finish()
            .map_err(|error| DandanError::persistence(error.to_string()))?;
        info!(
            path = %self.path.display(),
            entries = state.forward.len(),
            next_id = state.counter,
            "id snapshot written"
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.path
    }
}
