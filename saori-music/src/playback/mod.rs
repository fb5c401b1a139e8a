//! Playback: playlists, resolution, voice and the per-guild engine

pub mod dry_run;
pub mod engine;
pub mod resolver;
pub mod store;
pub mod voice;
pub mod ytdlp;

pub use dry_run::DryRunTransport;
pub use engine::{
    AddOutcome, EngineSettings, GuildStatus, PlaybackEngine, SkipOutcome, StopOutcome,
};
pub use resolver::{PlayableStream, ResolveFailure, ResolvedTrack, TrackResolver};
pub use store::PlaylistStore;
pub use voice::{
    StreamEnd, StreamHandle, VoiceConnection, VoiceConnectionManager, VoiceFailure,
    VoiceTransport,
};
pub use ytdlp::YtDlpResolver;
