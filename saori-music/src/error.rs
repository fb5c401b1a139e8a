//! Error types for saori-music
//!
//! `Error` covers service-level failures (configuration, I/O, HTTP,
//! persistence). `PlaybackError` is the typed outcome of engine operations
//! and is what command front ends render to users.

use thiserror::Error;

/// Main error type for saori-music
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Playlist snapshot could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from saori-common
    #[error(transparent)]
    Common(#[from] saori_common::Error),
}

/// Convenience Result type using saori-music Error
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome errors of playback engine operations
///
/// None of these leave a guild half-transitioned: every failure that
/// happens after `play` was accepted returns the guild to `Idle`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Requester has no active voice channel; nothing was changed
    #[error("Please join a voice channel first")]
    UserNotInVoiceChannel,

    /// No tracks are queued; nothing was changed
    #[error("The playlist is empty, please add a song")]
    EmptyPlaylist,

    /// Stream provider could not produce playable media; the track stays queued
    #[error("Unable to play {locator}: {reason}")]
    ResolutionError { locator: String, reason: String },

    /// Voice join or player subscription failed; the track stays queued
    #[error("Voice connection failed: {reason}")]
    ConnectionError { reason: String },

    /// Locator is not in the guild's playlist
    #[error("The song URL is not in the playlist: {locator}")]
    NotFound { locator: String },

    /// Skip requested while nothing is playing
    #[error("Nothing is playing")]
    NotPlaying,

    /// Removal of the track that is currently being played
    #[error("The song is currently playing, use skip instead: {locator}")]
    TrackInUse { locator: String },

    /// A pending play was superseded by a later stop or skip
    #[error("Playback request was cancelled")]
    Cancelled,

    /// Engine no longer accepts commands
    #[error("Playback engine is shutting down")]
    ShuttingDown,
}

impl PlaybackError {
    /// Stable identifier used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            PlaybackError::UserNotInVoiceChannel => "UserNotInVoiceChannel",
            PlaybackError::EmptyPlaylist => "EmptyPlaylist",
            PlaybackError::ResolutionError { .. } => "ResolutionError",
            PlaybackError::ConnectionError { .. } => "ConnectionError",
            PlaybackError::NotFound { .. } => "NotFound",
            PlaybackError::NotPlaying => "NotPlaying",
            PlaybackError::TrackInUse { .. } => "TrackInUse",
            PlaybackError::Cancelled => "Cancelled",
            PlaybackError::ShuttingDown => "ShuttingDown",
        }
    }

    /// True for bad preconditions supplied by the caller
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::UserNotInVoiceChannel
                | PlaybackError::EmptyPlaylist
                | PlaybackError::NotFound { .. }
                | PlaybackError::NotPlaying
                | PlaybackError::TrackInUse { .. }
        )
    }
}
