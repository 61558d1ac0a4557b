/*!
In-memory per-guild state: configured log channels and members seen since startup
*/

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use guildlog_platform::{ChannelId, GuildId, UserId};
use tracing::{debug, info};

/// Which channel receives log records for each guild.
#[derive(Default)]
pub struct GuildConfigStore {
    log_channels: RwLock<HashMap<GuildId, ChannelId>>,
}

impl GuildConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_channel(&self, guild: GuildId) -> Option<ChannelId> {
        self.log_channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild)
            .copied()
    }

    /// Replace the guild's log channel. Permission checks belong to the caller.
    pub fn set_log_channel(&self, guild: GuildId, channel: ChannelId) {
        let previous = self
            .log_channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild, channel);
        info!(
            "Log channel for guild {} set to {} (was {:?})",
            guild, channel, previous
        );
    }
}

/// Members observed per guild since process start. Sets only ever grow.
#[derive(Default)]
pub struct FirstSeenTracker {
    seen: Mutex<HashMap<GuildId, HashSet<UserId>>>,
}

impl FirstSeenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the guild's set with its current membership.
    pub fn seed(&self, guild: GuildId, members: impl IntoIterator<Item = UserId>) {
        let members: HashSet<UserId> = members.into_iter().collect();
        info!("Seeded {} known members for guild {}", members.len(), guild);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild, members);
    }

    /// Record a join. True only the first time this member is seen in this guild.
    pub fn observe_join(&self, guild: GuildId, member: UserId) -> bool {
        let first_time = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(guild)
            .or_default()
            .insert(member);
        debug!("Member {} joined guild {} (first time: {})", member, guild, first_time);
        first_time
    }

    pub fn known_count(&self, guild: GuildId) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild)
            .map_or(0, HashSet::len)
    }
}
