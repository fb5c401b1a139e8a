//! Track resolution seam
//!
//! A resolver turns a queued `TrackReference` into something the voice
//! layer can stream plus the display metadata users see. Resolution is
//! the only network-bound step before a voice join, and may be cancelled
//! at any await point by dropping the future.

use async_trait::async_trait;
use saori_common::{TrackMetadata, TrackReference};
use thiserror::Error;

/// Directly streamable media location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableStream {
    pub url: String,
    pub duration_seconds: Option<u64>,
}

/// Result of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    pub stream: PlayableStream,
    pub metadata: TrackMetadata,
}

/// Why a locator could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ResolveFailure {
    pub reason: String,
}

impl ResolveFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Produces a playable stream and metadata for a locator
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, track: &TrackReference) -> Result<ResolvedTrack, ResolveFailure>;
}
