/*!
Platform-side building blocks for the guild event relay: snowflake ids, the
member/channel/invite/audit data model, and the `GuildApi` capability trait with
its REST implementation.
*/

pub mod api;
pub mod error;
pub mod ids;
pub mod model;
pub mod rest;

#[cfg(feature = "test-util")]
pub mod mock;

pub use api::GuildApi;
pub use error::PlatformError;
pub use ids::{ChannelId, GuildId, RoleId, UserId};
pub use model::{
    AuditAction, AuditChange, AuditEntry, ChannelRef, GuildChannel, Invite, Member, Role,
    VoiceState, invite_url,
};
pub use rest::RestClient;

#[cfg(feature = "test-util")]
pub use mock::MockGuildApi;
