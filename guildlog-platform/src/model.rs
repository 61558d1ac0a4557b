/*!
Platform objects as the relay sees them: member snapshots, channels, invites and audit entries
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ChannelId, RoleId, UserId};

/// A role as carried on member snapshots. Two roles are equal when their ids
/// match, so a rename is not a different role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

impl PartialEq for Role {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Role {}

/// A guild member at one point in time. Update events carry two of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Server-side voice mute.
    #[serde(default)]
    pub mute: bool,
}

/// A channel reference with enough to render it after it is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub name: String,
}

/// Voice connection state of a member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub channel: Option<ChannelRef>,
    #[serde(default)]
    pub mute: bool,
}

/// A guild channel with the fields whose changes get logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildChannel {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub category: Option<ChannelRef>,
    #[serde(default)]
    pub topic: Option<String>,
    /// Slowmode delay in seconds.
    #[serde(default)]
    pub slowmode: u32,
}

/// An active invite and how many times it has been used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub code: String,
    #[serde(default)]
    pub uses: u64,
    #[serde(default)]
    pub inviter: Option<UserId>,
}

impl Invite {
    pub fn url(&self) -> String {
        invite_url(&self.code)
    }
}

pub fn invite_url(code: &str) -> String {
    format!("https://discord.gg/{code}")
}

/// Audit log action types the relay filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    MemberKick,
    MemberBanAdd,
    MemberUpdate,
    Other(u16),
}

impl AuditAction {
    /// Numeric action type used by the audit log API.
    pub fn code(self) -> u16 {
        match self {
            Self::MemberKick => 20,
            Self::MemberBanAdd => 22,
            Self::MemberUpdate => 24,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            20 => Self::MemberKick,
            22 => Self::MemberBanAdd,
            24 => Self::MemberUpdate,
            other => Self::Other(other),
        }
    }
}

impl Serialize for AuditAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u16::deserialize(deserializer).map(Self::from_code)
    }
}

/// One recorded before/after pair inside an audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChange {
    pub key: String,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
}

/// A privileged action recorded in a guild's audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(default)]
    pub target_id: Option<UserId>,
    /// The actor.
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(rename = "action_type")]
    pub action: AuditAction,
    #[serde(default)]
    pub changes: Vec<AuditChange>,
}

impl AuditEntry {
    pub fn targets(&self, user: UserId) -> bool {
        self.target_id == Some(user)
    }

    /// True when the entry records `key` with differing before and after values.
    pub fn field_changed(&self, key: &str) -> bool {
        self.changes
            .iter()
            .any(|change| change.key == key && change.old_value != change.new_value)
    }
}
