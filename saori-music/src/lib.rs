//! # Saori Music Player Library (saori-music)
//!
//! Per-guild music playback engine for the Saori Discord bot.
//!
//! **Purpose:** Keep a durable playlist per guild, resolve queued tracks into
//! playable streams, hold at most one voice connection per guild, and
//! advance through the playlist as streams complete. Exposes an HTTP/SSE
//! control surface for the slash-command front end and the dashboard.
//!
//! **Architecture:** One actor task per guild serializes every command and
//! completion event for that guild; guilds run independently.

pub mod api;
pub mod config;
pub mod error;
pub mod playback;

pub use error::{Error, PlaybackError, Result};
pub use playback::PlaybackEngine;
