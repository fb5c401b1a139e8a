//! Playlist change type definitions

use serde::{Deserialize, Serialize};

/// Why a guild's playlist changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PlaylistChangeTrigger {
    UserAdd,
    UserRemove,
    TrackCompletion,
    Skip,
    Stop,
}

impl std::fmt::Display for PlaylistChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaylistChangeTrigger::UserAdd => write!(f, "UserAdd"),
            PlaylistChangeTrigger::UserRemove => write!(f, "UserRemove"),
            PlaylistChangeTrigger::TrackCompletion => write!(f, "TrackCompletion"),
            PlaylistChangeTrigger::Skip => write!(f, "Skip"),
            PlaylistChangeTrigger::Stop => write!(f, "Stop"),
        }
    }
}
