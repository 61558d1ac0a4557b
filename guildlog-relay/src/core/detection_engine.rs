/*!
Audit-log based detection of who was behind a kick, ban or mute
*/

use std::sync::Arc;

use guildlog_platform::{AuditAction, AuditEntry, GuildApi, GuildId, PlatformError, UserId};
use tracing::{debug, warn};

use crate::core::config::AuditConfig;

/// Outcome of an audit-log lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Found(UserId),
    /// No matching entry within the lookback window.
    Missing,
    /// The audit log could not be read.
    Unavailable,
}

/// How a member left a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Kicked(UserId),
    Banned(UserId),
    Left,
    /// Left, but the audit log could not be checked for a kick or ban.
    LeftUnattributed,
}

struct RemovalRule {
    action: AuditAction,
    outcome: fn(UserId) -> Removal,
}

/// Checked in order; the first rule with a matching entry decides.
const REMOVAL_RULES: [RemovalRule; 2] = [
    RemovalRule {
        action: AuditAction::MemberKick,
        outcome: Removal::Kicked,
    },
    RemovalRule {
        action: AuditAction::MemberBanAdd,
        outcome: Removal::Banned,
    },
];

/// Audit-log field that records server mutes.
pub const MUTE_FIELD: &str = "mute";

/// Looks up the actor behind a state change. Lookups only inspect the most
/// recent `lookback` entries, so rapid bursts of similar actions can be
/// misattributed or missed.
pub struct AuditAttributor {
    api: Arc<dyn GuildApi>,
    config: AuditConfig,
}

impl AuditAttributor {
    pub fn new(api: Arc<dyn GuildApi>, config: AuditConfig) -> Self {
        Self { api, config }
    }

    async fn query(
        &self,
        guild: GuildId,
        action: AuditAction,
        lookback: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let entries = self.api.audit_log(guild, action, lookback).await?;
        debug!(
            "Fetched {} audit entries of type {} for guild {}",
            entries.len(),
            action.code(),
            guild
        );
        Ok(entries)
    }

    async fn find_matching(
        &self,
        guild: GuildId,
        action: AuditAction,
        lookback: u8,
        matches: impl Fn(&AuditEntry) -> bool,
    ) -> Attribution {
        match self.query(guild, action, lookback).await {
            Ok(entries) => entries
                .iter()
                .filter(|&entry| matches(entry))
                .find_map(|entry| entry.user_id)
                .map_or(Attribution::Missing, Attribution::Found),
            Err(e) if e.is_permission_denied() => {
                warn!("No access to the audit log of guild {}: {}", guild, e);
                Attribution::Unavailable
            }
            Err(e) => {
                warn!("Audit log query failed for guild {}: {}", guild, e);
                Attribution::Unavailable
            }
        }
    }

    /// Actor of the newest point action (kick, ban, ...) against `target`,
    /// trying `actions` in order.
    pub async fn find_actor(
        &self,
        guild: GuildId,
        target: UserId,
        actions: &[AuditAction],
        lookback: u8,
    ) -> Attribution {
        for &action in actions {
            match self
                .find_matching(guild, action, lookback, |entry| entry.targets(target))
                .await
            {
                Attribution::Missing => continue,
                decided => return decided,
            }
        }
        Attribution::Missing
    }

    /// Actor of the newest member update on `target` whose `field` changed.
    pub async fn find_field_actor(
        &self,
        guild: GuildId,
        target: UserId,
        field: &str,
        lookback: u8,
    ) -> Attribution {
        self.find_matching(guild, AuditAction::MemberUpdate, lookback, |entry| {
            entry.targets(target) && entry.field_changed(field)
        })
        .await
    }

    /// Who muted or unmuted `target`.
    pub async fn find_mute_actor(&self, guild: GuildId, target: UserId) -> Attribution {
        self.find_field_actor(guild, target, MUTE_FIELD, self.config.field_lookback)
            .await
    }

    /// Kick, then ban, then a plain leave.
    pub async fn resolve_removal(&self, guild: GuildId, member: UserId) -> Removal {
        for rule in &REMOVAL_RULES {
            match self
                .find_actor(guild, member, &[rule.action], self.config.point_lookback)
                .await
            {
                Attribution::Found(actor) => return (rule.outcome)(actor),
                Attribution::Missing => continue,
                Attribution::Unavailable => return Removal::LeftUnattributed,
            }
        }
        Removal::Left
    }
}
