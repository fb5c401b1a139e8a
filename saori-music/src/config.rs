//! saori-music specific configuration
//!
//! Loaded from `saori-music.toml` (path from `--config`, or the default
//! config location). Every field has a compiled default so an absent file
//! still yields a working service. CLI flags and environment variables
//! override the file for `port` and `data_folder`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Audio player service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP port for the control API
    pub port: u16,
    /// Folder holding the playlist snapshot file
    pub data_folder: Option<PathBuf>,
    /// Snapshot file name, relative to the data folder
    pub playlist_file: String,
    pub logging: LoggingConfig,
    pub resolver: ResolverConfig,
    pub voice: VoiceConfig,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5780,
            data_folder: None,
            playlist_file: "playlists.json".to_string(),
            logging: LoggingConfig::default(),
            resolver: ResolverConfig::default(),
            voice: VoiceConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate the TOML file at `path` (defaults when absent)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Config = saori_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.playlist_file.trim().is_empty() {
            return Err(Error::Config("playlist_file must not be empty".to_string()));
        }
        if self.engine.event_capacity == 0 {
            return Err(Error::Config("engine.event_capacity must be at least 1".to_string()));
        }
        if self.resolver.timeout_secs == 0
            || self.voice.connect_timeout_secs == 0
            || self.engine.idle_actor_secs == 0
        {
            return Err(Error::Config("timeouts must be at least one second".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for the `saori_music` target when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// External stream provider (yt-dlp compatible) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub program: String,
    pub timeout_secs: u64,
    pub extra_args: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            timeout_secs: 30,
            extra_args: Vec::new(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Upper bound on a single voice join
    pub connect_timeout_secs: u64,
    /// Dry-run stream length for tracks with unknown duration
    pub default_track_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            default_track_secs: 180,
        }
    }
}

impl VoiceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn default_track_length(&self) -> Duration {
        Duration::from_secs(self.default_track_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolve a track before accepting it into the playlist
    pub validate_on_add: bool,
    /// Broadcast buffer size for the event bus
    pub event_capacity: usize,
    /// Seconds an idle guild actor lingers before it is retired
    pub idle_actor_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_on_add: false,
            event_capacity: saori_common::events::EventBus::DEFAULT_CAPACITY,
            idle_actor_secs: 300,
        }
    }
}

impl EngineConfig {
    pub fn idle_actor_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_actor_secs)
    }
}
