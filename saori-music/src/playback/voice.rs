//! Voice connections
//!
//! `VoiceTransport` is the seam to the chat platform's voice gateway. The
//! `VoiceConnectionManager` owns the one-connection-per-guild rule: it
//! reuses an existing connection for a guild, bounds new joins with a
//! timeout, and makes teardown idempotent.

use super::resolver::PlayableStream;
use async_trait::async_trait;
use saori_common::{ChannelId, GuildId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Voice join, subscription or stream start failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct VoiceFailure {
    pub reason: String,
}

impl VoiceFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// How a stream stopped on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Finished,
    Errored(String),
}

/// A stream started on a voice connection
///
/// The end signal fires once when the stream finishes or fails by itself.
/// Stopping the stream (explicitly or by dropping the handle) does not
/// produce an end signal the engine acts on.
pub struct StreamHandle {
    ended: Option<oneshot::Receiver<StreamEnd>>,
    stopper: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl StreamHandle {
    pub fn new(
        ended: oneshot::Receiver<StreamEnd>,
        stopper: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            ended: Some(ended),
            stopper: Some(Box::new(stopper)),
        }
    }

    /// Take the end signal; `None` if already taken
    pub fn take_end_signal(&mut self) -> Option<oneshot::Receiver<StreamEnd>> {
        self.ended.take()
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stopper.take() {
            stop();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("stopped", &self.stopper.is_none())
            .finish()
    }
}

/// A joined voice channel able to carry one audio stream at a time
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Start streaming; replaces whatever the connection was playing
    async fn play(&self, stream: &PlayableStream) -> Result<StreamHandle, VoiceFailure>;

    async fn disconnect(&self);
}

/// Opens voice connections
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, VoiceFailure>;
}

/// Tracks the single live voice connection of each guild
pub struct VoiceConnectionManager {
    transport: Arc<dyn VoiceTransport>,
    connections: Mutex<HashMap<GuildId, Arc<dyn VoiceConnection>>>,
    connect_timeout: Duration,
}

impl VoiceConnectionManager {
    pub fn new(transport: Arc<dyn VoiceTransport>, connect_timeout: Duration) -> Self {
        Self {
            transport,
            connections: Mutex::new(HashMap::new()),
            connect_timeout,
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<GuildId, Arc<dyn VoiceConnection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Existing connection for `guild`, or a new one to `channel`
    ///
    /// Callers serialize joins per guild; the map lock is not held while
    /// the transport connects so guilds never wait on each other. A joined
    /// connection is registered without an intervening await, so a caller
    /// cancelled after the join cannot leave an untracked connection.
    pub async fn join_or_reuse(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceFailure> {
        let existing = self.connections().get(&guild).cloned();
        if let Some(existing) = existing {
            if existing.channel_id() != channel {
                debug!(
                    "Guild {} reusing connection in channel {} (requested {})",
                    guild,
                    existing.channel_id(),
                    channel
                );
            }
            return Ok(existing);
        }

        let connection: Arc<dyn VoiceConnection> =
            tokio::time::timeout(self.connect_timeout, self.transport.connect(guild, channel))
                .await
                .map_err(|_| {
                    VoiceFailure::new(format!(
                        "voice join timed out after {}s",
                        self.connect_timeout.as_secs()
                    ))
                })??
                .into();

        info!("Guild {} joined voice channel {}", guild, channel);
        let replaced = self.connections().insert(guild, connection.clone());
        if let Some(old) = replaced {
            warn!("Guild {} had a second voice connection, closing the old one", guild);
            old.disconnect().await;
        }

        Ok(connection)
    }

    /// Start `stream` on the guild's connection, replacing what it played
    pub async fn play(
        &self,
        guild: GuildId,
        stream: &PlayableStream,
    ) -> Result<StreamHandle, VoiceFailure> {
        let connection = self
            .connections()
            .get(&guild)
            .cloned()
            .ok_or_else(|| VoiceFailure::new("no voice connection for guild"))?;
        connection.play(stream).await
    }

    /// Tear down the guild's connection; no-op when none exists
    pub async fn destroy(&self, guild: GuildId) -> bool {
        let removed = self.connections().remove(&guild);
        match removed {
            Some(connection) => {
                connection.disconnect().await;
                info!("Guild {} left voice channel {}", guild, connection.channel_id());
                true
            }
            None => false,
        }
    }

    pub async fn destroy_all(&self) {
        let drained: Vec<_> = self.connections().drain().collect();
        for (guild, connection) in drained {
            connection.disconnect().await;
            debug!("Closed voice connection for guild {}", guild);
        }
    }

    pub async fn is_connected(&self, guild: GuildId) -> bool {
        self.connections().contains_key(&guild)
    }

    pub async fn active_guilds(&self) -> Vec<GuildId> {
        let mut guilds: Vec<_> = self.connections().keys().copied().collect();
        guilds.sort();
        guilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    struct CountingTransport {
        counters: Arc<Counters>,
        delay: Duration,
    }

    struct CountingConnection {
        channel: ChannelId,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl VoiceConnection for CountingConnection {
        fn channel_id(&self) -> ChannelId {
            self.channel
        }

        async fn play(&self, _stream: &PlayableStream) -> Result<StreamHandle, VoiceFailure> {
            let (_tx, rx) = oneshot::channel();
            Ok(StreamHandle::new(rx, || {}))
        }

        async fn disconnect(&self) {
            self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl VoiceTransport for CountingTransport {
        async fn connect(
            &self,
            _guild: GuildId,
            channel: ChannelId,
        ) -> Result<Box<dyn VoiceConnection>, VoiceFailure> {
            tokio::time::sleep(self.delay).await;
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingConnection {
                channel,
                counters: self.counters.clone(),
            }))
        }
    }

    fn manager(delay: Duration, timeout: Duration) -> (VoiceConnectionManager, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let transport = Arc::new(CountingTransport {
            counters: counters.clone(),
            delay,
        });
        (VoiceConnectionManager::new(transport, timeout), counters)
    }

    #[tokio::test]
    async fn test_join_reuses_existing_connection() {
        let (manager, counters) = manager(Duration::ZERO, Duration::from_secs(1));
        let guild = GuildId::new(1);

        manager.join_or_reuse(guild, ChannelId::new(10)).await.unwrap();
        let second = manager.join_or_reuse(guild, ChannelId::new(11)).await.unwrap();

        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(second.channel_id(), ChannelId::new(10));
        assert_eq!(manager.active_guilds().await, vec![guild]);
    }

    #[tokio::test]
    async fn test_play_requires_connection() {
        let (manager, _) = manager(Duration::ZERO, Duration::from_secs(1));
        let guild = GuildId::new(1);
        let stream = PlayableStream {
            url: "https://media.example/a.webm".to_string(),
            duration_seconds: None,
        };

        assert!(manager.play(guild, &stream).await.is_err());
        manager.join_or_reuse(guild, ChannelId::new(10)).await.unwrap();
        assert!(manager.play(guild, &stream).await.is_ok());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (manager, counters) = manager(Duration::ZERO, Duration::from_secs(1));
        let guild = GuildId::new(1);

        manager.join_or_reuse(guild, ChannelId::new(10)).await.unwrap();
        assert!(manager.destroy(guild).await);
        assert!(!manager.destroy(guild).await);
        assert!(!manager.is_connected(guild).await);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_timeout_is_failure() {
        let (manager, _) = manager(Duration::from_secs(5), Duration::from_millis(20));

        let err = match manager.join_or_reuse(GuildId::new(1), ChannelId::new(10)).await {
            Err(err) => err,
            Ok(_) => panic!("join should time out"),
        };
        assert!(err.reason.contains("timed out"));
        assert!(!manager.is_connected(GuildId::new(1)).await);
    }

    #[tokio::test]
    async fn test_destroy_all_clears_every_guild() {
        let (manager, counters) = manager(Duration::ZERO, Duration::from_secs(1));
        for id in 1..=3 {
            manager
                .join_or_reuse(GuildId::new(id), ChannelId::new(100 + id))
                .await
                .unwrap();
        }

        manager.destroy_all().await;
        assert!(manager.active_guilds().await.is_empty());
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stream_handle_stops_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = oneshot::channel();
        let counter = stops.clone();
        let mut handle = StreamHandle::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.stop();
        handle.stop();
        drop(handle);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
