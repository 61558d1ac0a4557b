/*!
Invite use-count snapshots, used to work out which invite a new member came in through
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use guildlog_platform::{GuildApi, GuildId, Invite, PlatformError, UserId};
use tracing::{debug, warn};

/// Active invites of one guild at one moment, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteSnapshot {
    invites: Vec<Invite>,
}

impl InviteSnapshot {
    pub fn new(invites: Vec<Invite>) -> Self {
        Self { invites }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Invite> {
        self.invites.iter()
    }
}

/// The invite credited for a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteCredit {
    pub code: String,
    pub inviter: Option<UserId>,
}

/// Credit the first invite, in `before` order, whose use count went up.
///
/// Invites missing from either side are ignored, so an invite revoked during
/// the window never gets credit. With concurrent joins several counts may rise;
/// only the first is reported.
pub fn diff_snapshots(before: &InviteSnapshot, after: &InviteSnapshot) -> Option<InviteCredit> {
    let after_uses: HashMap<&str, &Invite> = after
        .iter()
        .map(|invite| (invite.code.as_str(), invite))
        .collect();

    before.iter().find_map(|old| {
        let new = after_uses.get(old.code.as_str())?;
        (new.uses > old.uses).then(|| InviteCredit {
            code: old.code.clone(),
            inviter: old.inviter.or(new.inviter),
        })
    })
}

/// Brackets a join with two invite listings and diffs them.
pub struct InviteUsageTracker {
    api: Arc<dyn GuildApi>,
    settle: Duration,
}

impl InviteUsageTracker {
    /// `settle` is how long to wait for the platform to bump use counts.
    pub fn new(api: Arc<dyn GuildApi>, settle: Duration) -> Self {
        Self { api, settle }
    }

    pub async fn capture(&self, guild: GuildId) -> Result<InviteSnapshot, PlatformError> {
        self.api.list_invites(guild).await.map(InviteSnapshot::new)
    }

    /// Credit the invite behind a join. `before` must be captured before the
    /// join is processed; this waits for use counts to settle, lists again and diffs.
    pub async fn attribute_join(&self, guild: GuildId, before: &InviteSnapshot) -> Option<InviteCredit> {
        tokio::time::sleep(self.settle).await;

        let after = match self.capture(guild).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Cannot list invites for guild {}: {}", guild, e);
                return None;
            }
        };

        let credit = diff_snapshots(before, &after);
        debug!(
            "Invite diff for guild {} over {} invites: {:?}",
            guild,
            before.iter().count(),
            credit
        );
        credit
    }
}
