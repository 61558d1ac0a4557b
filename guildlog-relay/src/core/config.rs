/*!
Configuration management for the relay
*/

use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use guildlog_platform::{ChannelId, GuildId};
use serde::{Deserialize, Serialize};

use crate::core::settings::EventKind;
use crate::error::RelayError;

pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Platform API access
    pub discord: DiscordConfig,
    /// Event handling behaviour
    pub relay: RelaySettings,
    /// Audit log lookups
    pub audit: AuditConfig,
    /// Diagnostic logging
    pub logging: LoggingConfig,
    /// Initial event toggles
    pub events: EventsConfig,
    /// Log channels known before any command is run
    pub log_channels: Vec<LogChannelEntry>,
    /// Where records are delivered
    pub outputs: Vec<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub api_base: String,
    /// Bot token; falls back to the `DISCORD_TOKEN` environment variable.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    /// How long to wait for invite use counts to settle after a join
    pub invite_settle_ms: u64,
    /// chrono format string for record timestamps (local time)
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Entries inspected per kick/ban lookup
    pub point_lookback: u8,
    /// Entries inspected per member-update (mute) lookup
    pub field_lookback: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "guildlog_relay=debug,info"
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Event kinds that start switched off
    pub disabled: Vec<EventKind>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogChannelEntry {
    pub guild: GuildId,
    pub channel: ChannelId,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output plugin type
    #[serde(flatten)]
    pub plugin: OutputPlugin,
    /// Whether this output is enabled
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputPlugin {
    /// Post to the guild's configured log channel
    Channel,
    /// Print to stdout
    Terminal {
        #[serde(default)]
        format: TerminalFormat,
    },
    /// Append one JSON object per record
    Json { path: PathBuf },
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalFormat {
    #[default]
    Plain,
    Colored,
    Json,
}

fn enabled_by_default() -> bool {
    true
}

/// chrono panics when asked to render an invalid format, so reject it up front.
fn validate_timestamp_format(format: &str) -> Result<(), RelayError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(RelayError::InvalidTimestampFormat(format.to_string()));
    }
    Ok(())
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: guildlog_platform::rest::DEFAULT_API_BASE.to_string(),
            token: None,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            invite_settle_ms: 1500,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            point_lookback: 1,
            field_lookback: 25,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Default location: `<config dir>/guildlog/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("guildlog").join("config.toml"))
    }

    pub fn from_toml(content: &str) -> Result<Self, RelayError> {
        let mut config: RelayConfig = toml::from_str(content)?;
        validate_timestamp_format(&config.relay.timestamp_format)?;
        if config.outputs.is_empty() {
            config.outputs = Self::default_outputs();
        }
        Ok(config)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| RelayError::ConfigIo {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Channel delivery plus a plain terminal echo.
    pub fn default_outputs() -> Vec<OutputConfig> {
        vec![
            OutputConfig {
                plugin: OutputPlugin::Channel,
                enabled: true,
            },
            OutputConfig {
                plugin: OutputPlugin::Terminal {
                    format: TerminalFormat::Plain,
                },
                enabled: true,
            },
        ]
    }

    /// Token from the file, else from the environment.
    pub fn resolve_token(&self) -> Result<String, RelayError> {
        self.discord
            .token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|token| !token.trim().is_empty())
            .ok_or(RelayError::MissingToken)
    }
}
