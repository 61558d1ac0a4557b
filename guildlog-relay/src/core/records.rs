/*!
Log record type and the text of every record the relay can emit
*/

use chrono::{DateTime, Local};
use guildlog_platform::{ChannelId, ChannelRef, GuildChannel, GuildId, Invite, Member, UserId};
use serde::Serialize;

use crate::core::detection_engine::Removal;
use crate::core::invites::InviteCredit;
use crate::core::settings::EventKind;

pub const AUDIT_UNAVAILABLE: &str = "Bot does not have permission to view audit logs.";
pub const ONBOARDING_PROMPT: &str = "Please configure the bot using the command: `/setchannellog`";

const NONE: &str = "None";

/// One formatted line bound for a guild's log channel.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub kind: EventKind,
    pub timestamp: DateTime<Local>,
    pub body: String,
    /// `[timestamp] body`, as delivered.
    pub text: String,
}

/// Stamps bodies with local wall-clock time at the moment of formatting.
#[derive(Debug, Clone)]
pub struct RecordFormatter {
    timestamp_format: String,
}

impl RecordFormatter {
    pub fn new(timestamp_format: impl Into<String>) -> Self {
        Self {
            timestamp_format: timestamp_format.into(),
        }
    }

    pub fn stamp(&self, body: &str) -> String {
        format!("[{}] {}", Local::now().format(&self.timestamp_format), body)
    }

    pub fn record(&self, guild: GuildId, channel: ChannelId, kind: EventKind, body: String) -> LogRecord {
        let timestamp = Local::now();
        let text = format!("[{}] {}", timestamp.format(&self.timestamp_format), body);
        LogRecord {
            guild,
            channel,
            kind,
            timestamp,
            body,
            text,
        }
    }
}

pub fn joined(member: UserId) -> String {
    format!("{} has joined the server.", member.mention())
}

pub fn first_time_join(member: UserId) -> String {
    format!("{} has joined the server for the first time.", member.mention())
}

pub fn joined_via_invite(member: UserId, credit: &InviteCredit) -> String {
    match credit.inviter {
        Some(inviter) => format!(
            "{} joined the server using invite from {}",
            member.mention(),
            inviter.mention()
        ),
        None => format!("{} joined the server using invite {}", member.mention(), credit.code),
    }
}

pub fn removal(member: UserId, removal: Removal) -> String {
    let who = member.mention();
    match removal {
        Removal::Kicked(by) => format!("{who} was kicked from the server by {}.", by.mention()),
        Removal::Banned(by) => format!("{who} was banned from the server by {}.", by.mention()),
        Removal::Left => format!("{who} has left the server."),
        Removal::LeftUnattributed => {
            format!("{who} has left the server. (Unable to access audit logs)")
        }
    }
}

/// Nickname and role differences, in that order. Empty when nothing changed.
pub fn member_changes(before: &Member, after: &Member) -> Vec<String> {
    let mut changes = Vec::new();

    if before.nick != after.nick {
        changes.push(format!(
            "Nickname changed from {} to {}",
            before.nick.as_deref().unwrap_or(NONE),
            after.nick.as_deref().unwrap_or(NONE)
        ));
    }

    let added: Vec<&str> = after
        .roles
        .iter()
        .filter(|role| !before.roles.contains(role))
        .map(|role| role.name.as_str())
        .collect();
    let removed: Vec<&str> = before
        .roles
        .iter()
        .filter(|role| !after.roles.contains(role))
        .map(|role| role.name.as_str())
        .collect();

    if !added.is_empty() {
        changes.push(format!("Roles added: {}", added.join(", ")));
    }
    if !removed.is_empty() {
        changes.push(format!("Roles removed: {}", removed.join(", ")));
    }

    changes
}

pub fn member_updated(member: UserId, changes: &[String]) -> String {
    format!("{} has been updated: {}", member.mention(), changes.join(", "))
}

pub fn mute_changed(member: UserId, muted: bool, by: UserId) -> String {
    let verb = if muted { "mute" } else { "unmute" };
    format!("{} was {verb} by {}", member.mention(), by.mention())
}

fn voice_channel_label(channel: Option<&ChannelRef>) -> String {
    channel.map_or_else(|| NONE.to_string(), |c| c.id.mention())
}

/// Present only when the member actually moved.
pub fn voice_channel_change(
    member: UserId,
    before: Option<&ChannelRef>,
    after: Option<&ChannelRef>,
) -> Option<String> {
    let before_id = before.map(|c| c.id);
    let after_id = after.map(|c| c.id);
    (before_id != after_id).then(|| {
        format!(
            "{} voice channel changed from {} to {}",
            member.mention(),
            voice_channel_label(before),
            voice_channel_label(after)
        )
    })
}

pub fn channel_created(channel: &GuildChannel) -> String {
    format!("Channel created: {}", channel.id.mention())
}

/// Deleted channels can't be linked, so use the name.
pub fn channel_deleted(channel: &GuildChannel) -> String {
    format!("Channel deleted: {}", channel.name)
}

/// Differences among name, position, category, topic and slowmode.
pub fn channel_changes(before: &GuildChannel, after: &GuildChannel) -> Vec<String> {
    let mut changes = Vec::new();

    if before.name != after.name {
        changes.push(format!("Name changed from {} to {}", before.name, after.name));
    }
    if before.position != after.position {
        changes.push(format!(
            "Position changed from {} to {}",
            before.position, after.position
        ));
    }
    if before.category.as_ref().map(|c| c.id) != after.category.as_ref().map(|c| c.id) {
        changes.push(format!(
            "Category changed from {} to {}",
            before.category.as_ref().map_or(NONE, |c| c.name.as_str()),
            after.category.as_ref().map_or(NONE, |c| c.name.as_str())
        ));
    }
    if before.topic != after.topic {
        changes.push(format!(
            "Topic changed from {} to {}",
            before.topic.as_deref().filter(|t| !t.is_empty()).unwrap_or(NONE),
            after.topic.as_deref().filter(|t| !t.is_empty()).unwrap_or(NONE)
        ));
    }
    if before.slowmode != after.slowmode {
        changes.push(format!(
            "Slowmode delay changed from {} to {} seconds",
            before.slowmode, after.slowmode
        ));
    }

    changes
}

pub fn channel_updated(channel: ChannelId, changes: &[String]) -> String {
    format!("Channel updated: {} -> {}", channel.mention(), changes.join(", "))
}

pub fn invite_created(invite: &Invite) -> String {
    match invite.inviter {
        Some(inviter) => format!("Invite created: {} by {}", invite.url(), inviter.mention()),
        None => format!("Invite created: {}", invite.url()),
    }
}

pub fn member_kicked(member: UserId) -> String {
    format!("{} was kicked from the server.", member.mention())
}
