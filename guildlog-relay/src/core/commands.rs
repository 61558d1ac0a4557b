/*!
Slash commands that configure the relay
*/

use std::sync::Arc;

use guildlog_platform::{ChannelId, GuildApi, GuildId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::settings::{EventKind, EventSettingsStore};
use crate::core::state_manager::GuildConfigStore;

pub const HELP_TEXT: &str = "**Bot commands:**\n\
`/botsettings` - Show and toggle tracked events.\n\
`/setchannellog` - Set the channel that receives event logs.\n\
`/allcommands` - List all commands and what they do.";

pub const NO_PERMISSION: &str = "You do not have permission to set this channel.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Command {
    /// Show the settings menu.
    BotSettings,
    /// Flip one event toggle, as picked from the settings menu.
    Toggle { event: EventKind },
    SetChannelLog { channel: ChannelId },
    AllCommands,
}

/// Executes commands against the settings and guild stores.
pub struct CommandCenter {
    settings: Arc<EventSettingsStore>,
    guilds: Arc<GuildConfigStore>,
    api: Arc<dyn GuildApi>,
}

impl CommandCenter {
    pub fn new(
        settings: Arc<EventSettingsStore>,
        guilds: Arc<GuildConfigStore>,
        api: Arc<dyn GuildApi>,
    ) -> Self {
        Self {
            settings,
            guilds,
            api,
        }
    }

    /// The settings menu: one `Label (On|Off)` option per event kind.
    pub fn settings_menu(&self) -> Vec<String> {
        self.settings
            .snapshot()
            .into_iter()
            .map(|(kind, enabled)| format!("{} ({})", kind.label(), on_off(enabled)))
            .collect()
    }

    /// Run a command and return the reply text.
    pub async fn execute(&self, guild: GuildId, invoker: UserId, command: &Command) -> String {
        match command {
            Command::BotSettings => format!("Bot settings:\n{}", self.settings_menu().join("\n")),
            Command::Toggle { event } => {
                let enabled = self.settings.toggle(*event);
                info!("{} toggled {} by {}", event, on_off(enabled), invoker);
                format!("{} is now {}", event.label(), on_off(enabled))
            }
            Command::SetChannelLog { channel } => self.set_log_channel(guild, invoker, *channel).await,
            Command::AllCommands => HELP_TEXT.to_string(),
        }
    }

    async fn set_log_channel(&self, guild: GuildId, invoker: UserId, channel: ChannelId) -> String {
        match self.api.can_view_channel(guild, invoker, channel).await {
            Ok(true) => {
                self.guilds.set_log_channel(guild, channel);
                format!("Log channel set to {}", channel.mention())
            }
            Ok(false) => NO_PERMISSION.to_string(),
            Err(e) => {
                warn!(
                    "Permission check for {} on {} in guild {} failed: {}",
                    invoker, channel, guild, e
                );
                format!("Could not verify your permissions for {}.", channel.mention())
            }
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "On" } else { "Off" }
}
