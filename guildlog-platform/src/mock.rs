//! In-memory `GuildApi` for tests: scripted responses, recorded sends, no network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::api::GuildApi;
use crate::error::PlatformError;
use crate::ids::{ChannelId, GuildId, UserId};
use crate::model::{AuditAction, AuditEntry, Invite};

#[derive(Default)]
struct MockState {
    members: HashMap<GuildId, Vec<UserId>>,
    /// Successive invite listings; the last one keeps being returned.
    invites: HashMap<GuildId, VecDeque<Vec<Invite>>>,
    audit: HashMap<(GuildId, AuditAction), Vec<AuditEntry>>,
    audit_denied: HashSet<GuildId>,
    invites_denied: HashSet<GuildId>,
    viewable: HashSet<(UserId, ChannelId)>,
    audit_queries: Vec<(GuildId, AuditAction, u8)>,
    sent: Vec<(ChannelId, String)>,
}

/// Scriptable platform double.
#[derive(Default)]
pub struct MockGuildApi {
    state: Mutex<MockState>,
}

impl MockGuildApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_members(&self, guild: GuildId, members: Vec<UserId>) {
        self.state().members.insert(guild, members);
    }

    /// Queue one invite listing. Calls consume listings in order and repeat the last.
    pub fn push_invites(&self, guild: GuildId, invites: Vec<Invite>) {
        self.state().invites.entry(guild).or_default().push_back(invites);
    }

    /// Add an audit entry; entries are returned newest first, so push oldest first.
    pub fn push_audit(&self, guild: GuildId, entry: AuditEntry) {
        self.state()
            .audit
            .entry((guild, entry.action))
            .or_default()
            .insert(0, entry);
    }

    pub fn deny_audit(&self, guild: GuildId) {
        self.state().audit_denied.insert(guild);
    }

    pub fn deny_invites(&self, guild: GuildId) {
        self.state().invites_denied.insert(guild);
    }

    pub fn allow_view(&self, member: UserId, channel: ChannelId) {
        self.state().viewable.insert((member, channel));
    }

    /// Every message sent so far, in order.
    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.state().sent.clone()
    }

    pub fn audit_queries(&self) -> Vec<(GuildId, AuditAction, u8)> {
        self.state().audit_queries.clone()
    }
}

#[async_trait]
impl GuildApi for MockGuildApi {
    async fn list_members(&self, guild: GuildId) -> Result<Vec<UserId>, PlatformError> {
        Ok(self.state().members.get(&guild).cloned().unwrap_or_default())
    }

    async fn list_invites(&self, guild: GuildId) -> Result<Vec<Invite>, PlatformError> {
        let mut state = self.state();
        if state.invites_denied.contains(&guild) {
            return Err(PlatformError::PermissionDenied(format!("invites of {guild}")));
        }
        let Some(queue) = state.invites.get_mut(&guild) else {
            return Ok(Vec::new());
        };
        let listing = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(listing)
    }

    async fn audit_log(
        &self,
        guild: GuildId,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let mut state = self.state();
        state.audit_queries.push((guild, action, limit));
        if state.audit_denied.contains(&guild) {
            return Err(PlatformError::PermissionDenied(format!("audit log of {guild}")));
        }
        Ok(state
            .audit
            .get(&(guild, action))
            .map(|entries| entries.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        self.state().sent.push((channel, content.to_string()));
        Ok(())
    }

    async fn can_view_channel(
        &self,
        _guild: GuildId,
        member: UserId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError> {
        Ok(self.state().viewable.contains(&(member, channel)))
    }
}
