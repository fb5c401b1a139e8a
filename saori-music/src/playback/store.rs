//! Durable per-guild playlists
//!
//! The store is the single source of truth for queue order. Each guild owns
//! an ordered list of `TrackReference`s; duplicates are allowed and the
//! insertion order is preserved across restarts.
//!
//! Every mutation rewrites the full snapshot (`guild id -> [track]`) to a
//! temporary file and renames it over the snapshot path, so a crash never
//! leaves a half-written file behind. Writes are ordered by a version
//! counter: a snapshot older than one already written is discarded. A
//! failed write is logged and the in-memory change stands.

use crate::error::{Error, PlaybackError, Result};
use saori_common::{GuildId, TrackMetadata, TrackReference};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

type Playlists = BTreeMap<GuildId, Vec<TrackReference>>;

/// Per-guild ordered playlists persisted as a single JSON snapshot
pub struct PlaylistStore {
    path: PathBuf,
    playlists: RwLock<Playlists>,
    /// Version assigned to the most recent mutation
    version: AtomicU64,
    /// Version of the last snapshot handed to the filesystem
    written: Mutex<u64>,
}

impl PlaylistStore {
    /// Load the snapshot at `path`, or start empty
    ///
    /// A missing file is a fresh install. A file that cannot be decoded is
    /// moved aside to `<path>.corrupt` so the next write does not destroy
    /// it, and the store starts empty.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let playlists = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Playlists>(&bytes) {
                Ok(playlists) => {
                    let tracks: usize = playlists.values().map(Vec::len).sum();
                    info!(
                        "Loaded {} playlists ({} tracks) from {}",
                        playlists.len(),
                        tracks,
                        path.display()
                    );
                    playlists
                }
                Err(e) => {
                    error!("Playlist file {} is corrupt: {}", path.display(), e);
                    let aside = corrupt_path(&path);
                    match tokio::fs::rename(&path, &aside).await {
                        Ok(()) => warn!("Moved corrupt playlist file to {}", aside.display()),
                        Err(e) => error!("Failed to move corrupt playlist file aside: {}", e),
                    }
                    Playlists::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No playlist file at {}, starting empty", path.display());
                Playlists::new()
            }
            Err(e) => {
                error!("Failed to read playlist file {}: {}", path.display(), e);
                Playlists::new()
            }
        };

        Self {
            path,
            playlists: RwLock::new(playlists),
            version: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a track; returns its 1-based position
    pub async fn add_track(&self, guild: GuildId, track: TrackReference) -> usize {
        self.mutate(guild, |tracks| {
            tracks.push(track);
            (tracks.len(), true)
        })
        .await
    }

    /// Remove the first entry matching `locator`
    pub async fn remove_track(
        &self,
        guild: GuildId,
        locator: &str,
    ) -> std::result::Result<TrackReference, PlaybackError> {
        self.remove_track_from(guild, locator, 0).await
    }

    /// Remove the first entry matching `locator` at or after `start`
    ///
    /// Used while a track is active so the head entry is never removed
    /// out from under the session.
    pub(crate) async fn remove_track_from(
        &self,
        guild: GuildId,
        locator: &str,
        start: usize,
    ) -> std::result::Result<TrackReference, PlaybackError> {
        self.mutate(guild, |tracks| {
            let found = tracks
                .iter()
                .skip(start)
                .position(|track| track.matches(locator))
                .map(|offset| start + offset);
            match found {
                Some(index) => (Ok(tracks.remove(index)), true),
                None => (
                    Err(PlaybackError::NotFound {
                        locator: locator.to_string(),
                    }),
                    false,
                ),
            }
        })
        .await
    }

    /// Ordered snapshot of a guild's playlist; empty for unknown guilds
    pub async fn list_tracks(&self, guild: GuildId) -> Vec<TrackReference> {
        self.playlists
            .read()
            .await
            .get(&guild)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn len(&self, guild: GuildId) -> usize {
        self.playlists.read().await.get(&guild).map_or(0, Vec::len)
    }

    /// Head of the playlist, i.e. the next or current track
    pub async fn front(&self, guild: GuildId) -> Option<TrackReference> {
        self.playlists
            .read()
            .await
            .get(&guild)
            .and_then(|tracks| tracks.first().cloned())
    }

    /// Remove and return the head entry
    pub(crate) async fn pop_front(&self, guild: GuildId) -> Option<TrackReference> {
        self.mutate(guild, |tracks| {
            if tracks.is_empty() {
                (None, false)
            } else {
                (Some(tracks.remove(0)), true)
            }
        })
        .await
    }

    /// Record resolved display metadata on the head entry
    ///
    /// Only applies when the head still refers to `metadata.locator`. The
    /// cache is in-memory only; the snapshot keeps bare locators, so this
    /// never triggers a write.
    pub(crate) async fn cache_metadata(&self, guild: GuildId, metadata: &TrackMetadata) -> bool {
        self.mutate(guild, |tracks| match tracks.first_mut() {
            Some(head) if head.matches(&metadata.locator) => {
                let cached = TrackReference::with_metadata(metadata);
                let changed = head.title != cached.title || head.thumbnail != cached.thumbnail;
                *head = cached;
                (changed, false)
            }
            _ => (false, false),
        })
        .await
    }

    /// Apply `f` to a guild's list; persist when it reports a change
    async fn mutate<R>(
        &self,
        guild: GuildId,
        f: impl FnOnce(&mut Vec<TrackReference>) -> (R, bool),
    ) -> R {
        let (result, snapshot) = {
            let mut playlists = self.playlists.write().await;
            let tracks = playlists.entry(guild).or_default();
            let (result, changed) = f(tracks);
            if tracks.is_empty() {
                playlists.remove(&guild);
            }
            if !changed {
                return result;
            }
            let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
            (result, (version, encode(&playlists)))
        };

        let (version, encoded) = snapshot;
        if let Err(e) = self.persist(version, encoded).await {
            error!(
                "Failed to persist playlists (guild {}): {}",
                guild, e
            );
        }
        result
    }

    async fn persist(&self, version: u64, encoded: Result<Vec<u8>>) -> Result<()> {
        let mut written = self.written.lock().await;
        if *written >= version {
            debug!("Skipping stale playlist snapshot v{}", version);
            return Ok(());
        }
        *written = version;

        let bytes = encoded?;
        write_atomically(&self.path, &bytes).await
    }
}

fn encode(playlists: &Playlists) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(playlists)
        .map_err(|e| Error::Persistence(format!("failed to encode playlists: {}", e)))
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes).await.map_err(|e| {
        Error::Persistence(format!("failed to write {}: {}", tmp.display(), e))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        Error::Persistence(format!("failed to replace {}: {}", path.display(), e))
    })?;
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

fn corrupt_path(path: &Path) -> PathBuf {
    with_suffix(path, ".corrupt")
}
