//! Messages exchanged with a guild actor, and the outcomes it reports

use crate::error::PlaybackError;
use crate::playback::resolver::{ResolveFailure, ResolvedTrack};
use crate::playback::voice::{StreamEnd, StreamHandle, VoiceFailure};
use saori_common::events::PlaybackState;
use saori_common::{ChannelId, TrackMetadata, TrackReference};
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Requests from the engine front door
pub(crate) enum GuildCommand {
    Add {
        track: TrackReference,
        reply: Reply<usize>,
    },
    Remove {
        locator: String,
        reply: Reply<Result<TrackReference, PlaybackError>>,
    },
    Play {
        channel: Option<ChannelId>,
        reply: Reply<Result<TrackMetadata, PlaybackError>>,
    },
    Skip {
        reply: Reply<Result<SkipOutcome, PlaybackError>>,
    },
    Stop {
        reply: Reply<StopOutcome>,
    },
    Status {
        reply: Reply<GuildStatus>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Completions posted back by tasks the actor spawned
///
/// Each carries the generation it was started under; the actor drops any
/// whose generation is no longer current.
pub(crate) enum SessionEvent {
    Resolved {
        generation: u64,
        result: Result<ResolvedTrack, ResolveFailure>,
    },
    Connected {
        generation: u64,
        result: Result<StreamHandle, VoiceFailure>,
    },
    StreamEnded {
        generation: u64,
        end: StreamEnd,
    },
}

impl SessionEvent {
    pub(crate) fn generation(&self) -> u64 {
        match self {
            SessionEvent::Resolved { generation, .. }
            | SessionEvent::Connected { generation, .. }
            | SessionEvent::StreamEnded { generation, .. } => *generation,
        }
    }
}

/// Result of adding a track
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// 1-based position of the new entry
    pub position: usize,
    pub track: TrackReference,
}

/// Result of a skip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    /// Playback moved on to this track
    Advanced { next: TrackReference },
    /// The skipped track was the last one; the guild is idle
    QueueEmpty,
}

/// Result of a stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub previous_state: PlaybackState,
    /// Track removed from the playlist, if one was playing
    pub removed: Option<TrackReference>,
}

/// Point-in-time view of a guild's playback
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuildStatus {
    pub state: PlaybackState,
    /// Playlist head owned by the active session
    pub current: Option<TrackReference>,
    /// Metadata of the current track once resolved
    pub now_playing: Option<TrackMetadata>,
}
