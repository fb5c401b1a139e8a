//! Playback-related type definitions

use serde::{Deserialize, Serialize};

/// Per-guild playback state
///
/// Guilds start in `Idle` and cycle between `Idle` and `Playing`; the two
/// intermediate states are only held while a track is being resolved or a
/// voice connection is being established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Resolving,
    Connecting,
    Playing,
}

impl PlaybackState {
    /// True for every state that owns a playback session
    pub fn is_active(self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Resolving => write!(f, "Resolving"),
            PlaybackState::Connecting => write!(f, "Connecting"),
            PlaybackState::Playing => write!(f, "Playing"),
        }
    }
}

/// Category of a playback failure reported through `PlaybackFailed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FailureKind {
    /// Stream provider could not produce playable media
    Resolution,
    /// Voice join or player subscription failed
    Connection,
    /// Stream broke after playback had started
    Stream,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Resolution => write!(f, "Resolution"),
            FailureKind::Connection => write!(f, "Connection"),
            FailureKind::Stream => write!(f, "Stream"),
        }
    }
}
