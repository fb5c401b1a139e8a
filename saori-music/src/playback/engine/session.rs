//! Per-guild playback actor
//!
//! Owns the guild's state machine:
//!
//! ```text
//! Idle --play--> Resolving --resolved--> Connecting --stream started--> Playing
//!                    ^                                                     |
//!                    +------------- natural end / skip, next exists -------+
//! ```
//!
//! Any failure, stop, or an exhausted playlist returns the guild to `Idle`
//! and tears down its voice connection. Commands and task completions are
//! handled one at a time from the actor's mailbox; resolution, joining and
//! stream completion run in spawned tasks that post back tagged with the
//! generation they were started under. Cancelling bumps the generation and
//! aborts the in-flight task, so late completions are discarded.

use super::commands::{GuildCommand, GuildStatus, Reply, SessionEvent, SkipOutcome, StopOutcome};
use super::Retirement;
use crate::error::PlaybackError;
use crate::playback::resolver::{ResolveFailure, ResolvedTrack, TrackResolver};
use crate::playback::store::PlaylistStore;
use crate::playback::voice::{StreamEnd, StreamHandle, VoiceConnectionManager, VoiceFailure};
use chrono::Utc;
use saori_common::events::{
    EventBus, FailureKind, MusicEvent, PlaybackState, PlaylistChangeTrigger,
};
use saori_common::{ChannelId, GuildId, TrackMetadata, TrackReference};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type PlayReply = Reply<Result<TrackMetadata, PlaybackError>>;

/// Active playback of the playlist head
struct Session {
    /// Voice channel of the member who started playback
    channel: ChannelId,
    /// Always equal to the playlist head while the session exists
    track: TrackReference,
    now_playing: Option<TrackMetadata>,
    /// Resolve or connect attempt, or the completion listener
    task: Option<JoinHandle<()>>,
    stream: Option<StreamHandle>,
    /// Play requests answered once the track starts or fails
    waiters: Vec<PlayReply>,
}

impl Session {
    fn new(channel: ChannelId, track: TrackReference, waiter: PlayReply) -> Self {
        Self {
            channel,
            track,
            now_playing: None,
            task: None,
            stream: None,
            waiters: vec![waiter],
        }
    }
}

pub(super) struct GuildActor {
    guild: GuildId,
    store: Arc<PlaylistStore>,
    resolver: Arc<dyn TrackResolver>,
    voice: Arc<VoiceConnectionManager>,
    events: EventBus,
    commands: mpsc::UnboundedReceiver<GuildCommand>,
    notify_tx: mpsc::UnboundedSender<SessionEvent>,
    notify_rx: mpsc::UnboundedReceiver<SessionEvent>,
    retirement: Retirement,
    state: PlaybackState,
    generation: u64,
    session: Option<Session>,
}

impl GuildActor {
    pub(super) fn new(
        guild: GuildId,
        store: Arc<PlaylistStore>,
        resolver: Arc<dyn TrackResolver>,
        voice: Arc<VoiceConnectionManager>,
        events: EventBus,
        commands: mpsc::UnboundedReceiver<GuildCommand>,
        retirement: Retirement,
    ) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            guild,
            store,
            resolver,
            voice,
            events,
            commands,
            notify_tx,
            notify_rx,
            retirement,
            state: PlaybackState::Idle,
            generation: 0,
            session: None,
        }
    }

    pub(super) async fn run(mut self) {
        debug!("Guild {} actor started", self.guild);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.end_session(PlaybackError::ShuttingDown).await;
                        break;
                    }
                },
                Some(event) = self.notify_rx.recv() => self.handle_event(event).await,
                _ = tokio::time::sleep(self.retirement.idle_after()), if self.session.is_none() => {
                    match self.retirement.retire(self.guild, &mut self.commands).await {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => {
                            debug!("Guild {} actor retiring while idle", self.guild);
                            break;
                        }
                    }
                }
            }
        }

        debug!("Guild {} actor stopped", self.guild);
    }

    /// Returns false once the actor should exit
    async fn handle_command(&mut self, command: GuildCommand) -> bool {
        match command {
            GuildCommand::Add { track, reply } => {
                let position = self.store.add_track(self.guild, track).await;
                self.playlist_changed(PlaylistChangeTrigger::UserAdd).await;
                let _ = reply.send(position);
            }
            GuildCommand::Remove { locator, reply } => {
                let result = self.remove(&locator).await;
                if result.is_ok() {
                    self.playlist_changed(PlaylistChangeTrigger::UserRemove).await;
                }
                let _ = reply.send(result);
            }
            GuildCommand::Play { channel, reply } => self.play(channel, reply).await,
            GuildCommand::Skip { reply } => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            GuildCommand::Stop { reply } => {
                let outcome = self.stop().await;
                let _ = reply.send(outcome);
            }
            GuildCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            GuildCommand::Shutdown { reply } => {
                self.end_session(PlaybackError::ShuttingDown).await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        if event.generation() != self.generation {
            debug!(
                "Guild {} ignoring stale completion (generation {}, current {})",
                self.guild,
                event.generation(),
                self.generation
            );
            return;
        }

        match event {
            SessionEvent::Resolved { result, .. } if self.state == PlaybackState::Resolving => {
                self.on_resolved(result).await
            }
            SessionEvent::Connected { result, .. } if self.state == PlaybackState::Connecting => {
                self.on_connected(result).await
            }
            SessionEvent::StreamEnded { end, .. } if self.state == PlaybackState::Playing => {
                self.on_stream_end(end).await
            }
            _ => debug!(
                "Guild {} ignoring completion that does not match state {}",
                self.guild, self.state
            ),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn remove(&mut self, locator: &str) -> Result<TrackReference, PlaybackError> {
        let Some(session) = &self.session else {
            return self.store.remove_track(self.guild, locator).await;
        };

        // The head belongs to the session; only later entries are removable.
        match self.store.remove_track_from(self.guild, locator, 1).await {
            Err(PlaybackError::NotFound { .. }) if session.track.matches(locator) => {
                Err(PlaybackError::TrackInUse {
                    locator: locator.to_string(),
                })
            }
            other => other,
        }
    }

    async fn play(&mut self, channel: Option<ChannelId>, reply: PlayReply) {
        let Some(channel) = channel else {
            let _ = reply.send(Err(PlaybackError::UserNotInVoiceChannel));
            return;
        };

        if let Some(session) = self.session.as_mut() {
            match (&session.now_playing, self.state) {
                (Some(metadata), PlaybackState::Playing) => {
                    let _ = reply.send(Ok(metadata.clone()));
                }
                _ => session.waiters.push(reply),
            }
            return;
        }

        let Some(track) = self.store.front(self.guild).await else {
            let _ = reply.send(Err(PlaybackError::EmptyPlaylist));
            return;
        };

        info!(
            "Guild {} starting playback of {} in channel {}",
            self.guild, track.locator, channel
        );
        self.session = Some(Session::new(channel, track, reply));
        self.begin_resolve();
    }

    async fn skip(&mut self) -> Result<SkipOutcome, PlaybackError> {
        let Some(session) = &self.session else {
            return Err(PlaybackError::NotPlaying);
        };
        info!("Guild {} skipping {}", self.guild, session.track.locator);

        Ok(match self.advance(PlaylistChangeTrigger::Skip).await {
            Some(next) => SkipOutcome::Advanced { next },
            None => SkipOutcome::QueueEmpty,
        })
    }

    async fn stop(&mut self) -> StopOutcome {
        let previous_state = self.state;

        // Only a track that actually started counts as played; an attempt
        // still resolving or connecting keeps its entry.
        let removed = if previous_state == PlaybackState::Playing {
            self.cancel_in_flight().await;
            let removed = self.store.pop_front(self.guild).await;
            if let Some(track) = &removed {
                self.events.emit_lossy(MusicEvent::TrackFinished {
                    guild_id: self.guild,
                    locator: track.locator.clone(),
                    completed: false,
                    timestamp: Utc::now(),
                });
            }
            self.playlist_changed(PlaylistChangeTrigger::Stop).await;
            removed
        } else {
            None
        };

        info!("Guild {} stopped from state {}", self.guild, previous_state);
        self.end_session(PlaybackError::Cancelled).await;

        StopOutcome {
            previous_state,
            removed,
        }
    }

    fn status(&self) -> GuildStatus {
        match &self.session {
            Some(session) => GuildStatus {
                state: self.state,
                current: Some(session.track.clone()),
                now_playing: session.now_playing.clone(),
            },
            None => GuildStatus::default(),
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn begin_resolve(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let track = session.track.clone();
        let resolver = self.resolver.clone();
        let notify = self.notify_tx.clone();
        session.task = Some(tokio::spawn(async move {
            let result = resolver.resolve(&track).await;
            let _ = notify.send(SessionEvent::Resolved { generation, result });
        }));

        self.set_state(PlaybackState::Resolving);
    }

    async fn on_resolved(&mut self, result: Result<ResolvedTrack, ResolveFailure>) {
        let resolved = match result {
            Ok(resolved) => resolved,
            Err(failure) => {
                let locator = self.current_locator().unwrap_or_default();
                warn!(
                    "Guild {} could not resolve {}: {}",
                    self.guild, locator, failure.reason
                );
                let error = PlaybackError::ResolutionError {
                    locator,
                    reason: failure.reason,
                };
                self.fail(FailureKind::Resolution, error).await;
                return;
            }
        };

        self.store.cache_metadata(self.guild, &resolved.metadata).await;

        let generation = self.generation;
        let guild = self.guild;
        let voice = self.voice.clone();
        let notify = self.notify_tx.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        debug!("Guild {} resolved {}", guild, resolved.metadata.title);
        session.track = TrackReference::with_metadata(&resolved.metadata);
        session.now_playing = Some(resolved.metadata);
        let channel = session.channel;
        let stream = resolved.stream;
        session.task = Some(tokio::spawn(async move {
            let result = match voice.join_or_reuse(guild, channel).await {
                Ok(_) => voice.play(guild, &stream).await,
                Err(e) => Err(e),
            };
            let _ = notify.send(SessionEvent::Connected { generation, result });
        }));

        self.set_state(PlaybackState::Connecting);
    }

    async fn on_connected(&mut self, result: Result<StreamHandle, VoiceFailure>) {
        let mut handle = match result {
            Ok(handle) => handle,
            Err(failure) => {
                warn!("Guild {} voice connection failed: {}", self.guild, failure);
                let error = PlaybackError::ConnectionError {
                    reason: failure.reason,
                };
                self.fail(FailureKind::Connection, error).await;
                return;
            }
        };

        let generation = self.generation;
        let notify = self.notify_tx.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let metadata = session
            .now_playing
            .get_or_insert_with(|| TrackMetadata {
                locator: session.track.locator.clone(),
                title: session.track.display_title().to_string(),
                thumbnail: session.track.thumbnail.clone(),
                duration_seconds: None,
            })
            .clone();

        session.task = handle.take_end_signal().map(|ended| {
            tokio::spawn(async move {
                let end = ended.await.unwrap_or_else(|_| {
                    StreamEnd::Errored("stream closed without reporting an end".to_string())
                });
                let _ = notify.send(SessionEvent::StreamEnded { generation, end });
            })
        });
        session.stream = Some(handle);
        for waiter in session.waiters.drain(..) {
            let _ = waiter.send(Ok(metadata.clone()));
        }

        info!("Guild {} now playing {}", self.guild, metadata.title);
        self.set_state(PlaybackState::Playing);
        self.events.emit_lossy(MusicEvent::TrackStarted {
            guild_id: self.guild,
            track: metadata,
            timestamp: Utc::now(),
        });
    }

    async fn on_stream_end(&mut self, end: StreamEnd) {
        match end {
            StreamEnd::Finished => {
                debug!("Guild {} track finished", self.guild);
                self.advance(PlaylistChangeTrigger::TrackCompletion).await;
            }
            StreamEnd::Errored(reason) => {
                warn!("Guild {} stream failed: {}", self.guild, reason);
                self.fail(FailureKind::Stream, PlaybackError::ConnectionError { reason })
                    .await;
            }
        }
    }

    /// Drop the head and move on to the next entry, or go idle
    ///
    /// The head is removed exactly once per advance; the voice connection is
    /// kept for the next track.
    async fn advance(&mut self, trigger: PlaylistChangeTrigger) -> Option<TrackReference> {
        self.cancel_in_flight().await;
        if let Some(session) = self.session.as_mut() {
            for waiter in session.waiters.drain(..) {
                let _ = waiter.send(Err(PlaybackError::Cancelled));
            }
        }

        if let Some(finished) = self.store.pop_front(self.guild).await {
            self.events.emit_lossy(MusicEvent::TrackFinished {
                guild_id: self.guild,
                locator: finished.locator,
                completed: trigger == PlaylistChangeTrigger::TrackCompletion,
                timestamp: Utc::now(),
            });
        }
        self.playlist_changed(trigger).await;

        match self.store.front(self.guild).await {
            Some(next) => {
                if let Some(session) = self.session.as_mut() {
                    session.track = next.clone();
                    session.now_playing = None;
                }
                self.begin_resolve();
                Some(next)
            }
            None => {
                info!("Guild {} reached the end of its playlist", self.guild);
                self.end_session(PlaybackError::Cancelled).await;
                None
            }
        }
    }

    /// Report a failure and return to idle; the head entry stays queued
    async fn fail(&mut self, kind: FailureKind, error: PlaybackError) {
        self.events.emit_lossy(MusicEvent::PlaybackFailed {
            guild_id: self.guild,
            locator: self.current_locator(),
            kind,
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
        self.end_session(error).await;
    }

    /// Enter `Idle`: cancel work, answer waiters, release the voice connection
    async fn end_session(&mut self, waiter_error: PlaybackError) {
        self.cancel_in_flight().await;
        if let Some(session) = self.session.take() {
            for waiter in session.waiters {
                let _ = waiter.send(Err(waiter_error.clone()));
            }
        }
        self.voice.destroy(self.guild).await;
        self.set_state(PlaybackState::Idle);
    }

    /// Abort the attempt or listener and stop any stream
    ///
    /// Waits for the aborted task so nothing it owned outlives this call.
    async fn cancel_in_flight(&mut self) {
        self.generation += 1;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(task) = session.task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut stream) = session.stream.take() {
            stream.stop();
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn current_locator(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.track.locator.clone())
    }

    fn set_state(&mut self, new_state: PlaybackState) {
        if self.state == new_state {
            return;
        }
        let old_state = std::mem::replace(&mut self.state, new_state);
        debug!("Guild {} state {} -> {}", self.guild, old_state, new_state);
        self.events.emit_lossy(MusicEvent::PlaybackStateChanged {
            guild_id: self.guild,
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    async fn playlist_changed(&self, trigger: PlaylistChangeTrigger) {
        let length = self.store.len(self.guild).await;
        self.events.emit_lossy(MusicEvent::PlaylistChanged {
            guild_id: self.guild,
            length,
            trigger,
            timestamp: Utc::now(),
        });
    }
}
