//! Discord snowflake identifiers
//!
//! Guilds and channels are both addressed by 64-bit snowflakes. They are kept
//! as distinct newtypes so a channel id can never be passed where a guild id
//! is expected.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|e| Error::InvalidInput(format!("invalid {} '{}': {}", $label, s, e)))
            }
        }
    };
}

snowflake!(
    /// Guild (server) identifier; scopes playlists and playback sessions
    GuildId,
    "guild id"
);

snowflake!(
    /// Voice or text channel identifier
    ChannelId,
    "channel id"
);
