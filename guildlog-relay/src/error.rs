//! Errors surfaced by the relay service.

use guildlog_platform::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to read {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid timestamp format: {0:?}")]
    InvalidTimestampFormat(String),

    #[error("no bot token: set discord.token or DISCORD_TOKEN")]
    MissingToken,

    /// A line from the event source that is not a recognised event.
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    #[error("event source error: {0}")]
    Source(#[from] std::io::Error),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}
