//! Playback engine
//!
//! Front door for every playlist and playback operation. Each guild gets a
//! lazily spawned actor (see `session`) that owns its state machine; the
//! engine only routes requests to the right mailbox and waits for replies.
//! Operations on different guilds never wait on each other. An actor with
//! no session retires after `EngineSettings::idle_timeout` without work and
//! is respawned by the next command for its guild.

mod commands;
mod session;

pub use commands::{AddOutcome, GuildStatus, SkipOutcome, StopOutcome};

use crate::error::PlaybackError;
use crate::playback::resolver::TrackResolver;
use crate::playback::store::PlaylistStore;
use crate::playback::voice::VoiceConnectionManager;
use commands::GuildCommand;
use saori_common::events::{EventBus, MusicEvent};
use saori_common::{ChannelId, GuildId, TrackMetadata, TrackReference};
use session::GuildActor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Engine behaviour switches
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Resolve every track before accepting it into a playlist
    pub validate_on_add: bool,
    /// How long a guild actor with no session waits for work before retiring
    pub idle_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            validate_on_add: false,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&crate::config::EngineConfig> for EngineSettings {
    fn from(config: &crate::config::EngineConfig) -> Self {
        Self {
            validate_on_add: config.validate_on_add,
            idle_timeout: config.idle_actor_timeout(),
        }
    }
}

struct GuildHandle {
    /// Distinguishes a respawned actor from the one it replaced
    id: u64,
    commands: mpsc::UnboundedSender<GuildCommand>,
    task: JoinHandle<()>,
}

/// Live guild actors
///
/// Commands are sent while this lock is held, and an idle actor only leaves
/// the map under it after finding its mailbox empty, so no command is ever
/// sent to an actor that has retired.
type Registry = Arc<Mutex<HashMap<GuildId, GuildHandle>>>;

/// Per-guild playback coordinator
pub struct PlaybackEngine {
    store: Arc<PlaylistStore>,
    resolver: Arc<dyn TrackResolver>,
    voice: Arc<VoiceConnectionManager>,
    events: EventBus,
    settings: EngineSettings,
    guilds: Registry,
    next_actor: AtomicU64,
    closed: AtomicBool,
}

impl PlaybackEngine {
    pub fn new(
        store: Arc<PlaylistStore>,
        resolver: Arc<dyn TrackResolver>,
        voice: Arc<VoiceConnectionManager>,
        events: EventBus,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            voice,
            events,
            settings,
            guilds: Arc::new(Mutex::new(HashMap::new())),
            next_actor: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a track to the guild's playlist
    ///
    /// With `validate_on_add` enabled the locator is resolved first and
    /// rejected if unplayable.
    pub async fn add_track(
        &self,
        guild: GuildId,
        locator: impl Into<String>,
    ) -> Result<AddOutcome, PlaybackError> {
        let locator = locator.into();
        if self.settings.validate_on_add {
            return self.add_validated(guild, locator).await;
        }
        self.append(guild, TrackReference::new(locator)).await
    }

    /// Resolve a locator and append it with its metadata cached
    pub async fn add_validated(
        &self,
        guild: GuildId,
        locator: impl Into<String>,
    ) -> Result<AddOutcome, PlaybackError> {
        let track = TrackReference::new(locator);
        let resolved = self.resolver.resolve(&track).await.map_err(|failure| {
            PlaybackError::ResolutionError {
                locator: track.locator.clone(),
                reason: failure.reason,
            }
        })?;
        self.append(guild, TrackReference::with_metadata(&resolved.metadata))
            .await
    }

    async fn append(
        &self,
        guild: GuildId,
        track: TrackReference,
    ) -> Result<AddOutcome, PlaybackError> {
        let queued = track.clone();
        let position = self
            .request(guild, |reply| GuildCommand::Add {
                track: queued,
                reply,
            })
            .await?;
        debug!("Guild {} queued {} at {}", guild, track.locator, position);
        Ok(AddOutcome { position, track })
    }

    /// Remove the first queued entry for `locator`
    ///
    /// The track currently being played cannot be removed; use `skip`.
    pub async fn remove_track(
        &self,
        guild: GuildId,
        locator: &str,
    ) -> Result<TrackReference, PlaybackError> {
        let locator = locator.to_string();
        self.request(guild, |reply| GuildCommand::Remove { locator, reply })
            .await?
    }

    /// Current playlist, head first
    pub async fn list_tracks(&self, guild: GuildId) -> Vec<TrackReference> {
        self.store.list_tracks(guild).await
    }

    /// Start playing the head of the playlist in the requester's channel
    ///
    /// `channel` is the requester's current voice channel, `None` when they
    /// are not in one. Resolves once the track is streaming (or fails). If
    /// the guild is already playing, returns the current track.
    pub async fn play(
        &self,
        guild: GuildId,
        channel: Option<ChannelId>,
    ) -> Result<TrackMetadata, PlaybackError> {
        self.request(guild, |reply| GuildCommand::Play { channel, reply })
            .await?
    }

    /// Drop the current track and move to the next one
    pub async fn skip(&self, guild: GuildId) -> Result<SkipOutcome, PlaybackError> {
        self.request(guild, |reply| GuildCommand::Skip { reply })
            .await?
    }

    /// Halt playback and leave the voice channel
    pub async fn stop(&self, guild: GuildId) -> Result<StopOutcome, PlaybackError> {
        self.request(guild, |reply| GuildCommand::Stop { reply })
            .await
    }

    /// State of the guild; a guild without a live actor is idle
    pub async fn status(&self, guild: GuildId) -> GuildStatus {
        let (reply, rx) = oneshot::channel();
        {
            let guilds = self.guilds.lock().await;
            let Some(handle) = guilds.get(&guild) else {
                return GuildStatus::default();
            };
            if handle.commands.send(GuildCommand::Status { reply }).is_err() {
                return GuildStatus::default();
            }
        }
        rx.await.unwrap_or_default()
    }

    /// Number of guilds with a live actor
    pub async fn active_guilds(&self) -> usize {
        self.guilds.lock().await.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MusicEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<PlaylistStore> {
        &self.store
    }

    pub fn voice(&self) -> &Arc<VoiceConnectionManager> {
        &self.voice
    }

    /// Stop every guild, release all voice connections, refuse new work
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down playback engine");

        let handles: Vec<_> = self.guilds.lock().await.drain().collect();
        for (guild, handle) in handles {
            let (reply, rx) = oneshot::channel();
            if handle.commands.send(GuildCommand::Shutdown { reply }).is_ok() {
                let _ = rx.await;
            }
            if let Err(e) = handle.task.await {
                warn!("Guild {} actor ended abnormally: {}", guild, e);
            }
        }

        self.voice.destroy_all().await;
        info!("Playback engine stopped");
    }

    async fn request<T>(
        &self,
        guild: GuildId,
        command: impl FnOnce(oneshot::Sender<T>) -> GuildCommand,
    ) -> Result<T, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(guild, command(reply)).await?;
        rx.await.map_err(|_| PlaybackError::ShuttingDown)
    }

    /// Deliver a command to the guild's actor, spawning one if needed
    async fn dispatch(&self, guild: GuildId, command: GuildCommand) -> Result<(), PlaybackError> {
        let mut guilds = self.guilds.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlaybackError::ShuttingDown);
        }

        let handle = guilds.entry(guild).or_insert_with(|| {
            let id = self.next_actor.fetch_add(1, Ordering::SeqCst);
            debug!("Spawning playback actor {} for guild {}", id, guild);
            let (commands, rx) = mpsc::unbounded_channel();
            let actor = GuildActor::new(
                guild,
                self.store.clone(),
                self.resolver.clone(),
                self.voice.clone(),
                self.events.clone(),
                rx,
                Retirement {
                    registry: self.guilds.clone(),
                    id,
                    idle_after: self.settings.idle_timeout,
                },
            );
            GuildHandle {
                id,
                commands,
                task: tokio::spawn(actor.run()),
            }
        });
        handle
            .commands
            .send(command)
            .map_err(|_| PlaybackError::ShuttingDown)
    }
}

/// What an actor needs to take itself out of the registry when idle
pub(super) struct Retirement {
    registry: Registry,
    id: u64,
    idle_after: Duration,
}

impl Retirement {
    pub(super) fn idle_after(&self) -> Duration {
        self.idle_after
    }

    /// Remove the actor's registry entry unless a command is waiting
    ///
    /// Returns the waiting command instead, if there is one.
    pub(super) async fn retire(
        &self,
        guild: GuildId,
        commands: &mut mpsc::UnboundedReceiver<GuildCommand>,
    ) -> Option<GuildCommand> {
        let mut guilds = self.registry.lock().await;
        match commands.try_recv() {
            Ok(command) => Some(command),
            Err(_) => {
                if guilds.get(&guild).map(|handle| handle.id) == Some(self.id) {
                    guilds.remove(&guild);
                }
                None
            }
        }
    }
}
