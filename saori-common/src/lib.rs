//! # Saori Common Library
//!
//! Shared code for the Saori music services including:
//! - Guild and channel identifiers
//! - Track references and resolved track metadata
//! - Event types (MusicEvent enum) and the EventBus
//! - Configuration folder resolution

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod track;

pub use error::{Error, Result};
pub use ids::{ChannelId, GuildId};
pub use track::{TrackMetadata, TrackReference};
