//! Event types for the Saori event system
//!
//! Provides shared event definitions and the EventBus used by the playback
//! engine and its HTTP surface.

mod playback_types;
mod playlist_types;

pub use playback_types::{FailureKind, PlaybackState};
pub use playlist_types::PlaylistChangeTrigger;

use crate::ids::GuildId;
use crate::track::TrackMetadata;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Music event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MusicEvent {
    /// Guild moved to a new playback state
    PlaybackStateChanged {
        guild_id: GuildId,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track started streaming into the voice channel
    TrackStarted {
        guild_id: GuildId,
        track: TrackMetadata,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track left the playlist after playing
    TrackFinished {
        guild_id: GuildId,
        locator: String,
        /// false when the track was skipped
        completed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playlist contents changed
    PlaylistChanged {
        guild_id: GuildId,
        /// Playlist length after the change
        length: usize,
        trigger: PlaylistChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Resolution, connection or stream failure
    ///
    /// Emitted for every failure, including those raised during automatic
    /// advancement where no caller is waiting on a result.
    PlaybackFailed {
        guild_id: GuildId,
        locator: Option<String>,
        kind: FailureKind,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MusicEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            MusicEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            MusicEvent::TrackStarted { .. } => "TrackStarted",
            MusicEvent::TrackFinished { .. } => "TrackFinished",
            MusicEvent::PlaylistChanged { .. } => "PlaylistChanged",
            MusicEvent::PlaybackFailed { .. } => "PlaybackFailed",
        }
    }

    pub fn guild_id(&self) -> GuildId {
        match self {
            MusicEvent::PlaybackStateChanged { guild_id, .. }
            | MusicEvent::TrackStarted { guild_id, .. }
            | MusicEvent::TrackFinished { guild_id, .. }
            | MusicEvent::PlaylistChanged { guild_id, .. }
            | MusicEvent::PlaybackFailed { guild_id, .. } => *guild_id,
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use saori_common::events::{EventBus, MusicEvent, PlaybackState};
/// use saori_common::GuildId;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(MusicEvent::PlaybackStateChanged {
///     guild_id: GuildId::new(1),
///     old_state: PlaybackState::Idle,
///     new_state: PlaybackState::Resolving,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MusicEvent>,
    capacity: usize,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MusicEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MusicEvent,
    ) -> Result<usize, broadcast::error::SendError<MusicEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MusicEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = MusicEvent::PlaylistChanged {
            guild_id: GuildId::new(7),
            length: 2,
            trigger: PlaylistChangeTrigger::UserAdd,
            timestamp: chrono::Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "PlaylistChanged");
        assert_eq!(value["guild_id"], 7);
        assert_eq!(value["trigger"], "UserAdd");
        assert_eq!(event.event_type(), "PlaylistChanged");
    }

    #[tokio::test]
    async fn test_bus_delivers_to_every_subscriber() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let sent = bus
            .emit(MusicEvent::TrackFinished {
                guild_id: GuildId::new(1),
                locator: "https://youtu.be/a".to_string(),
                completed: true,
                timestamp: chrono::Utc::now(),
            })
            .unwrap();
        assert_eq!(sent, 2);

        assert_eq!(first.recv().await.unwrap().guild_id(), GuildId::new(1));
        assert_eq!(second.recv().await.unwrap().event_type(), "TrackFinished");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        let event = MusicEvent::PlaybackStateChanged {
            guild_id: GuildId::new(1),
            old_state: PlaybackState::Idle,
            new_state: PlaybackState::Resolving,
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.capacity(), 4);
    }
}
