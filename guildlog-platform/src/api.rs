/*!
The narrow set of platform capabilities the relay consumes
*/

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::ids::{ChannelId, GuildId, UserId};
use crate::model::{AuditAction, AuditEntry, Invite};

/// Read and send access to a guild, implemented over REST in production and
/// in memory for tests.
#[async_trait]
pub trait GuildApi: Send + Sync {
    /// Every current member of the guild.
    async fn list_members(&self, guild: GuildId) -> Result<Vec<UserId>, PlatformError>;

    /// Active invites, in the order the platform lists them.
    async fn list_invites(&self, guild: GuildId) -> Result<Vec<Invite>, PlatformError>;

    /// The `limit` most recent audit entries of one action type, newest first.
    async fn audit_log(
        &self,
        guild: GuildId,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError>;

    /// Post a plain text message. Delivery is not confirmed beyond the call succeeding.
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError>;

    /// Whether `member` may view `channel`.
    async fn can_view_channel(
        &self,
        guild: GuildId,
        member: UserId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError>;
}
