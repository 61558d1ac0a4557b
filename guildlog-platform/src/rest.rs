/*!
REST implementation of `GuildApi` against a Discord-compatible v10 HTTP API
*/

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::api::GuildApi;
use crate::error::PlatformError;
use crate::ids::{ChannelId, GuildId, RoleId, UserId};
use crate::model::{AuditAction, AuditEntry, Invite};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const MEMBER_PAGE_SIZE: usize = 1000;

const ADMINISTRATOR: u64 = 1 << 3;
const VIEW_CHANNEL: u64 = 1 << 10;

fn permission_bits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Deserialize)]
struct WireUser {
    id: UserId,
}

#[derive(Deserialize)]
struct WireMember {
    user: WireUser,
    #[serde(default)]
    roles: Vec<RoleId>,
}

#[derive(Deserialize)]
struct WireInvite {
    code: String,
    #[serde(default)]
    uses: u64,
    #[serde(default)]
    inviter: Option<WireUser>,
}

#[derive(Deserialize)]
struct WireAuditLog {
    #[serde(default)]
    audit_log_entries: Vec<AuditEntry>,
}

#[derive(Deserialize)]
struct WireGuild {
    owner_id: UserId,
}

#[derive(Deserialize)]
struct WireRole {
    id: RoleId,
    #[serde(deserialize_with = "permission_bits")]
    permissions: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionOverwrite {
    #[serde(deserialize_with = "permission_bits")]
    pub id: u64,
    /// 0 for a role, 1 for a member.
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(deserialize_with = "permission_bits")]
    pub allow: u64,
    #[serde(deserialize_with = "permission_bits")]
    pub deny: u64,
}

#[derive(Deserialize)]
struct WireChannel {
    #[serde(default)]
    permission_overwrites: Vec<PermissionOverwrite>,
}

/// Inputs for resolving a member's effective permissions in one channel.
pub struct PermissionContext<'a> {
    pub guild: GuildId,
    pub owner: UserId,
    pub member: UserId,
    pub member_roles: &'a [RoleId],
    pub guild_roles: &'a [(RoleId, u64)],
    pub overwrites: &'a [PermissionOverwrite],
}

/// Applies role permissions and channel overwrites the way the platform does:
/// owner and administrator bypass everything, then @everyone, role and member
/// overwrites are applied in that order.
pub fn can_view(ctx: &PermissionContext<'_>) -> bool {
    if ctx.member == ctx.owner {
        return true;
    }

    let everyone = RoleId(ctx.guild.get());
    let mut perms = ctx
        .guild_roles
        .iter()
        .filter(|(id, _)| *id == everyone || ctx.member_roles.contains(id))
        .fold(0u64, |acc, (_, bits)| acc | bits);

    if perms & ADMINISTRATOR != 0 {
        return true;
    }

    if let Some(ow) = ctx.overwrites.iter().find(|ow| ow.kind == 0 && ow.id == everyone.get()) {
        perms &= !ow.deny;
        perms |= ow.allow;
    }

    let (allow, deny) = ctx
        .overwrites
        .iter()
        .filter(|ow| ow.kind == 0 && ctx.member_roles.iter().any(|r| r.get() == ow.id))
        .fold((0u64, 0u64), |(a, d), ow| (a | ow.allow, d | ow.deny));
    perms &= !deny;
    perms |= allow;

    if let Some(ow) = ctx.overwrites.iter().find(|ow| ow.kind == 1 && ow.id == ctx.member.get()) {
        perms &= !ow.deny;
        perms |= ow.allow;
    }

    perms & VIEW_CHANNEL != 0
}

/// Bot-token authenticated HTTP client.
pub struct RestClient {
    client: Client,
    base: String,
    token: String,
}

impl RestClient {
    pub fn with_base(base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bot {}", self.token))
    }

    async fn execute(&self, route: &str, request: RequestBuilder) -> Result<String, PlatformError> {
        debug!("platform request: {}", route);
        let response = self.authorized(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::FORBIDDEN => Err(PlatformError::PermissionDenied(route.to_string())),
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound(route.to_string())),
            s => Err(PlatformError::Status {
                route: route.to_string(),
                status: s.as_u16(),
                body,
            }),
        }
    }

    async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T, PlatformError> {
        let url = format!("{}{}", self.base, route);
        let body = self.execute(route, self.client.get(url)).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl GuildApi for RestClient {
    async fn list_members(&self, guild: GuildId) -> Result<Vec<UserId>, PlatformError> {
        let mut members = Vec::new();
        let mut after = 0u64;

        loop {
            let route = format!("/guilds/{guild}/members?limit={MEMBER_PAGE_SIZE}&after={after}");
            let page: Vec<WireMember> = self.get(&route).await?;
            let page_len = page.len();

            members.extend(page.into_iter().map(|m| m.user.id));
            match members.last() {
                Some(last) if page_len == MEMBER_PAGE_SIZE => after = last.get(),
                _ => break,
            }
        }

        debug!("listed {} members of guild {}", members.len(), guild);
        Ok(members)
    }

    async fn list_invites(&self, guild: GuildId) -> Result<Vec<Invite>, PlatformError> {
        let invites: Vec<WireInvite> = self.get(&format!("/guilds/{guild}/invites")).await?;
        Ok(invites
            .into_iter()
            .map(|inv| Invite {
                code: inv.code,
                uses: inv.uses,
                inviter: inv.inviter.map(|u| u.id),
            })
            .collect())
    }

    async fn audit_log(
        &self,
        guild: GuildId,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let route = format!(
            "/guilds/{guild}/audit-logs?action_type={}&limit={}",
            action.code(),
            limit.clamp(1, 100)
        );
        let log: WireAuditLog = self.get(&route).await?;
        Ok(log.audit_log_entries)
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        let route = format!("/channels/{channel}/messages");
        let url = format!("{}{}", self.base, route);
        // Log lines mention users; don't ping them.
        let payload = serde_json::json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        self.execute(&route, self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    async fn can_view_channel(
        &self,
        guild: GuildId,
        member: UserId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError> {
        let info: WireGuild = self.get(&format!("/guilds/{guild}")).await?;
        let roles: Vec<WireRole> = self.get(&format!("/guilds/{guild}/roles")).await?;
        let wire_member: WireMember = self.get(&format!("/guilds/{guild}/members/{member}")).await?;
        let wire_channel: WireChannel = self.get(&format!("/channels/{channel}")).await?;

        let guild_roles: Vec<(RoleId, u64)> = roles.iter().map(|r| (r.id, r.permissions)).collect();

        Ok(can_view(&PermissionContext {
            guild,
            owner: info.owner_id,
            member,
            member_roles: &wire_member.roles,
            guild_roles: &guild_roles,
            overwrites: &wire_channel.permission_overwrites,
        }))
    }
}
