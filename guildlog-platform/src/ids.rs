/*!
Snowflake identifiers for guilds, users, channels and roles
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The platform sends snowflakes as strings, but hand-written event files
/// often use plain numbers. Accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Number(u64),
    Text(String),
}

fn parse_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match RawSnowflake::deserialize(deserializer)? {
        RawSnowflake::Number(n) => Ok(n),
        RawSnowflake::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

macro_rules! snowflake {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
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
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                parse_snowflake(deserializer).map(Self)
            }
        }
    };
}

snowflake!(
    /// A guild (community).
    GuildId
);
snowflake!(
    /// A user, scoped to whichever guild it appears in.
    UserId
);
snowflake!(
    /// A text, voice or category channel.
    ChannelId
);
snowflake!(RoleId);

impl UserId {
    /// `<@id>`, rendered by clients as a clickable user mention.
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}

impl ChannelId {
    /// `<#id>`, rendered by clients as a channel link.
    pub fn mention(self) -> String {
        format!("<#{}>", self.0)
    }
}
