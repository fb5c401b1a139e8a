//! Shared fixtures for engine and API integration tests
//!
//! `ScriptedResolver` answers every locator with canned metadata unless told
//! to fail it or hold it. `FakeTransport` records joins and leaves, can hold
//! joins open, and lets a test end the current stream of a guild on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use saori_common::events::{EventBus, PlaybackState};
use saori_common::{ChannelId, GuildId, TrackMetadata, TrackReference};
use saori_music::playback::{
    EngineSettings, PlayableStream, PlaybackEngine, PlaylistStore, ResolveFailure, ResolvedTrack,
    StreamEnd, StreamHandle, TrackResolver, VoiceConnection, VoiceConnectionManager, VoiceFailure,
    VoiceTransport,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{oneshot, Semaphore};

pub const GUILD: GuildId = GuildId::new(1001);
pub const CHANNEL: ChannelId = ChannelId::new(2002);

pub fn title_of(locator: &str) -> String {
    format!("Title of {}", locator)
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Default)]
pub struct ScriptedResolver {
    failing: Mutex<HashSet<String>>,
    held: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every resolution of `locator` fail
    pub fn fail(&self, locator: &str) {
        self.failing.lock().unwrap().insert(locator.to_string());
    }

    /// Block resolutions of `locator` until `release` is called
    pub fn hold(&self, locator: &str) {
        self.held
            .lock()
            .unwrap()
            .insert(locator.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, locator: &str) {
        if let Some(gate) = self.held.lock().unwrap().remove(locator) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TrackResolver for ScriptedResolver {
    async fn resolve(&self, track: &TrackReference) -> Result<ResolvedTrack, ResolveFailure> {
        self.calls.lock().unwrap().push(track.locator.clone());

        let gate = self.held.lock().unwrap().get(&track.locator).cloned();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        if self.failing.lock().unwrap().contains(&track.locator) {
            return Err(ResolveFailure::new("Video unavailable"));
        }

        Ok(ResolvedTrack {
            stream: PlayableStream {
                url: format!("stream://{}", track.locator),
                duration_seconds: Some(60),
            },
            metadata: TrackMetadata {
                locator: track.locator.clone(),
                title: title_of(&track.locator),
                thumbnail: None,
                duration_seconds: Some(60),
            },
        })
    }
}

// ============================================================================
// Voice transport
// ============================================================================

#[derive(Default)]
struct TransportState {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    stops: AtomicUsize,
    fail_connect: AtomicBool,
    /// When set, `connect` waits for a permit before joining
    connect_gate: Mutex<Option<Arc<Semaphore>>>,
    next_stream: AtomicU64,
    /// Live stream per guild: (stream id, end sender)
    streams: Mutex<HashMap<GuildId, (u64, oneshot::Sender<StreamEnd>)>>,
    played: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<TransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connects(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Block new voice joins until `release_connects` is called
    pub fn hold_connects(&self) {
        *self.state.connect_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_connects(&self) {
        if let Some(gate) = self.state.connect_gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    /// Stream URLs in the order they were started
    pub fn played(&self) -> Vec<String> {
        self.state.played.lock().unwrap().clone()
    }

    /// End the guild's current stream naturally; false if none is live
    pub fn finish(&self, guild: GuildId) -> bool {
        self.end(guild, StreamEnd::Finished)
    }

    pub fn break_stream(&self, guild: GuildId, reason: &str) -> bool {
        self.end(guild, StreamEnd::Errored(reason.to_string()))
    }

    fn end(&self, guild: GuildId, end: StreamEnd) -> bool {
        let live = self.state.streams.lock().unwrap().remove(&guild);
        match live {
            Some((_, sender)) => sender.send(end).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, VoiceFailure> {
        let gate = self.state.connect_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(VoiceFailure::new("missing Connect permission"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            guild,
            channel,
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    guild: GuildId,
    channel: ChannelId,
    state: Arc<TransportState>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel
    }

    async fn play(&self, stream: &PlayableStream) -> Result<StreamHandle, VoiceFailure> {
        let id = self.state.next_stream.fetch_add(1, Ordering::SeqCst);
        let (ended_tx, ended_rx) = oneshot::channel();
        self.state
            .streams
            .lock()
            .unwrap()
            .insert(self.guild, (id, ended_tx));
        self.state.played.lock().unwrap().push(stream.url.clone());

        let state = self.state.clone();
        let guild = self.guild;
        Ok(StreamHandle::new(ended_rx, move || {
            state.stops.fetch_add(1, Ordering::SeqCst);
            let mut streams = state.streams.lock().unwrap();
            if streams.get(&guild).map(|(live, _)| *live) == Some(id) {
                streams.remove(&guild);
            }
        }))
    }

    async fn disconnect(&self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Engine harness
// ============================================================================

pub struct Harness {
    pub engine: Arc<PlaybackEngine>,
    pub resolver: Arc<ScriptedResolver>,
    pub transport: FakeTransport,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(EngineSettings::default()).await
    }

    pub async fn with_settings(settings: EngineSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(PlaylistStore::load(dir.path().join("playlists.json")).await);
        let resolver = ScriptedResolver::new();
        let transport = FakeTransport::new();
        let voice = Arc::new(VoiceConnectionManager::new(
            Arc::new(transport.clone()),
            Duration::from_secs(2),
        ));
        let engine = Arc::new(PlaybackEngine::new(
            store,
            resolver.clone(),
            voice,
            EventBus::new(256),
            settings,
        ));

        Self {
            engine,
            resolver,
            transport,
            dir,
        }
    }

    pub async fn add_all(&self, guild: GuildId, locators: &[&str]) {
        for locator in locators {
            self.engine.add_track(guild, *locator).await.unwrap();
        }
    }

    pub async fn locators(&self, guild: GuildId) -> Vec<String> {
        self.engine
            .list_tracks(guild)
            .await
            .into_iter()
            .map(|t| t.locator)
            .collect()
    }

    /// Poll until the guild reaches `state` (and `current`, if given)
    pub async fn wait_for(&self, guild: GuildId, state: PlaybackState, current: Option<&str>) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let status = self.engine.status(guild).await;
            let current_matches = match current {
                Some(locator) => status.current.as_ref().map(|t| t.locator.as_str()) == Some(locator),
                None => true,
            };
            if status.state == state && current_matches {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "guild {} never reached {:?} (current {:?}); last status {:?}",
                    guild, state, current, status
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
