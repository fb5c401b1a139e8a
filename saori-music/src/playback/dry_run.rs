//! Dry-run voice transport
//!
//! Stands in for the voice gateway when the service runs without a bot
//! session: joins always succeed, and each stream "plays" for the track
//! duration (or a configured default) before reporting it finished.

use super::resolver::PlayableStream;
use super::voice::{StreamEnd, StreamHandle, VoiceConnection, VoiceFailure, VoiceTransport};
use async_trait::async_trait;
use saori_common::{ChannelId, GuildId};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::info;

pub struct DryRunTransport {
    default_length: Duration,
}

impl DryRunTransport {
    pub fn new(default_length: Duration) -> Self {
        Self { default_length }
    }
}

#[async_trait]
impl VoiceTransport for DryRunTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, VoiceFailure> {
        info!("[dry-run] guild {} joining channel {}", guild, channel);
        Ok(Box::new(DryRunConnection {
            guild,
            channel,
            default_length: self.default_length,
        }))
    }
}

struct DryRunConnection {
    guild: GuildId,
    channel: ChannelId,
    default_length: Duration,
}

#[async_trait]
impl VoiceConnection for DryRunConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel
    }

    async fn play(&self, stream: &PlayableStream) -> Result<StreamHandle, VoiceFailure> {
        let length = stream
            .duration_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_length);
        info!(
            "[dry-run] guild {} streaming {} for {:?}",
            self.guild, stream.url, length
        );

        let (ended_tx, ended_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(length) => {
                    let _ = ended_tx.send(StreamEnd::Finished);
                }
                _ = stop_rx => {}
            }
        });

        Ok(StreamHandle::new(ended_rx, move || {
            let _ = stop_tx.send(());
        }))
    }

    async fn disconnect(&self) {
        info!("[dry-run] guild {} leaving channel {}", self.guild, self.channel);
    }
}
