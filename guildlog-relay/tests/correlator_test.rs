use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use guildlog_platform::{
    AuditAction, AuditChange, AuditEntry, ChannelId, ChannelRef, GuildChannel, GuildId, Invite,
    Member, MockGuildApi, Role, RoleId, UserId, VoiceState,
};
use guildlog_relay::core::commands::Command;
use guildlog_relay::core::config::{OutputConfig, OutputPlugin};
use guildlog_relay::core::output_plugins::{OutputHandler, OutputManager};
use guildlog_relay::core::records::{AUDIT_UNAVAILABLE, LogRecord, ONBOARDING_PROMPT};
use guildlog_relay::{EventCorrelator, EventKind, GatewayEvent, RelayConfig, RelayError, Stores};
use serde_json::json;

const GUILD: GuildId = GuildId(1000);
const LOGS: ChannelId = ChannelId(2000);
const MEMBER: UserId = UserId(3000);
const MOD: UserId = UserId(4000);

fn config() -> RelayConfig {
    let mut config = RelayConfig::from_toml("").expect("defaults should parse");
    config.relay.invite_settle_ms = 5;
    config
}

fn correlator(api: &Arc<MockGuildApi>) -> EventCorrelator {
    let config = config();
    let outputs = OutputManager::new(
        &[OutputConfig {
            plugin: OutputPlugin::Channel,
            enabled: true,
        }],
        api.clone(),
    );
    EventCorrelator::new(api.clone(), Stores::from_config(&config), &config, outputs)
}

/// A correlator whose guild already has a log channel.
fn configured(api: &Arc<MockGuildApi>) -> EventCorrelator {
    let relay = correlator(api);
    relay.stores().guilds.set_log_channel(GUILD, LOGS);
    relay
}

/// Keeps every record it is handed.
#[derive(Clone, Default)]
struct RecordingOutput {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingOutput {
    fn kinds(&self) -> Vec<EventKind> {
        self.records.lock().unwrap().iter().map(|r| r.kind).collect()
    }
}

#[async_trait]
impl OutputHandler for RecordingOutput {
    fn name(&self) -> &'static str {
        "Recording"
    }

    async fn handle_record(&self, record: &LogRecord) -> Result<(), RelayError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Delivered texts with the `[timestamp] ` prefix removed.
fn bodies(api: &MockGuildApi) -> Vec<String> {
    api.sent()
        .into_iter()
        .map(|(channel, text)| {
            assert_eq!(channel, LOGS, "records must go to the log channel");
            assert!(text.starts_with('['), "record should be timestamped: {text}");
            text.split_once("] ")
                .map(|(_, body)| body.to_string())
                .unwrap_or(text)
        })
        .collect()
}

fn invite(code: &str, uses: u64, inviter: UserId) -> Invite {
    Invite {
        code: code.into(),
        uses,
        inviter: Some(inviter),
    }
}

fn member(nick: Option<&str>, roles: &[(u64, &str)], mute: bool) -> Member {
    Member {
        id: MEMBER,
        nick: nick.map(str::to_string),
        roles: roles
            .iter()
            .map(|(id, name)| Role {
                id: RoleId(*id),
                name: name.to_string(),
            })
            .collect(),
        mute,
    }
}

fn audit(action: AuditAction, target: UserId, actor: UserId) -> AuditEntry {
    AuditEntry {
        target_id: Some(target),
        user_id: Some(actor),
        action,
        changes: Vec::new(),
    }
}

fn mute_audit(target: UserId, actor: UserId, muted: bool) -> AuditEntry {
    AuditEntry {
        changes: vec![AuditChange {
            key: "mute".into(),
            old_value: Some(json!(!muted)),
            new_value: Some(json!(muted)),
        }],
        ..audit(AuditAction::MemberUpdate, target, actor)
    }
}

fn voice(channel: Option<(u64, &str)>, mute: bool) -> VoiceState {
    VoiceState {
        channel: channel.map(|(id, name)| ChannelRef {
            id: ChannelId(id),
            name: name.into(),
        }),
        mute,
    }
}

fn text_channel(topic: Option<&str>) -> GuildChannel {
    GuildChannel {
        id: ChannelId(77),
        name: "general".into(),
        position: 0,
        category: None,
        topic: topic.map(str::to_string),
        slowmode: 0,
    }
}

#[tokio::test]
async fn unconfigured_guild_never_emits() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, audit(AuditAction::MemberKick, MEMBER, MOD));
    let relay = correlator(&api);

    let events = vec![
        GatewayEvent::MemberJoin {
            guild: GUILD,
            member: MEMBER,
        },
        GatewayEvent::MemberRemove {
            guild: GUILD,
            member: MEMBER,
        },
        GatewayEvent::MemberUpdate {
            guild: GUILD,
            before: member(None, &[], false),
            after: member(Some("x"), &[], true),
        },
        GatewayEvent::VoiceStateUpdate {
            guild: GUILD,
            member: MEMBER,
            before: voice(None, false),
            after: voice(Some((5, "Lounge")), true),
        },
        GatewayEvent::ChannelCreate {
            guild: GUILD,
            channel: text_channel(None),
        },
        GatewayEvent::InviteCreate {
            guild: GUILD,
            invite: invite("abc", 0, MOD),
        },
        GatewayEvent::MemberKick {
            guild: GUILD,
            member: MEMBER,
        },
    ];
    for event in events {
        relay.handle(event).await;
    }

    assert!(api.sent().is_empty());
    assert!(api.audit_queries().is_empty(), "no lookups without a destination");
}

#[tokio::test]
async fn first_join_emits_join_first_time_and_invite_records() {
    let api = Arc::new(MockGuildApi::new());
    api.push_invites(GUILD, vec![invite("A", 5, MOD), invite("B", 2, UserId(9))]);
    api.push_invites(GUILD, vec![invite("A", 6, MOD), invite("B", 2, UserId(9))]);
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberJoin {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec![
            "<@3000> has joined the server.",
            "<@3000> has joined the server for the first time.",
            "<@3000> joined the server using invite from <@4000>",
        ]
    );
}

#[tokio::test]
async fn returning_member_is_not_a_first_timer() {
    let api = Arc::new(MockGuildApi::new());
    api.set_members(GUILD, vec![MEMBER]);
    let relay = configured(&api);

    relay.handle(GatewayEvent::Ready { guilds: vec![GUILD] }).await;
    relay
        .handle(GatewayEvent::MemberJoin {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(bodies(&api), vec!["<@3000> has joined the server."]);
}

#[tokio::test]
async fn invite_record_ignores_the_join_toggle() {
    let api = Arc::new(MockGuildApi::new());
    api.push_invites(GUILD, vec![invite("A", 1, MOD)]);
    api.push_invites(GUILD, vec![invite("A", 2, MOD)]);
    let relay = configured(&api);
    relay.stores().settings.toggle(EventKind::MemberJoin);
    relay.stores().settings.toggle(EventKind::FirstTimeJoin);

    relay
        .handle(GatewayEvent::MemberJoin {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec!["<@3000> joined the server using invite from <@4000>"]
    );
    assert!(
        !relay.stores().first_seen.observe_join(GUILD, MEMBER),
        "the join is recorded even when its record is switched off"
    );
}

#[tokio::test]
async fn kick_is_attributed_without_a_plain_leave() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, audit(AuditAction::MemberKick, MEMBER, MOD));
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberRemove {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec!["<@3000> was kicked from the server by <@4000>."]
    );
}

#[tokio::test]
async fn ban_is_attributed_when_no_kick_matches() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, audit(AuditAction::MemberBanAdd, MEMBER, MOD));
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberRemove {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec!["<@3000> was banned from the server by <@4000>."]
    );
}

#[tokio::test]
async fn denied_audit_log_degrades_member_remove() {
    let api = Arc::new(MockGuildApi::new());
    api.deny_audit(GUILD);
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberRemove {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec!["<@3000> has left the server. (Unable to access audit logs)"]
    );
}

#[tokio::test]
async fn member_update_joins_changes_into_one_record() {
    let api = Arc::new(MockGuildApi::new());
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberUpdate {
            guild: GUILD,
            before: member(Some("old"), &[(1, "Guest")], false),
            after: member(Some("new"), &[(2, "Mod")], false),
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec![
            "<@3000> has been updated: Nickname changed from old to new, Roles added: Mod, Roles removed: Guest"
        ]
    );
}

#[tokio::test]
async fn unchanged_member_update_emits_nothing() {
    let api = Arc::new(MockGuildApi::new());
    let relay = configured(&api);
    let same = member(Some("nick"), &[(1, "Guest")], false);

    relay
        .handle(GatewayEvent::MemberUpdate {
            guild: GUILD,
            before: same.clone(),
            after: same,
        })
        .await;

    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn member_update_mute_is_attributed_even_when_updates_are_off() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, mute_audit(MEMBER, MOD, true));
    let relay = configured(&api);
    for kind in [
        EventKind::MemberUpdate,
        EventKind::MemberMute,
        EventKind::MemberUnmute,
    ] {
        relay.stores().settings.toggle(kind);
    }

    relay
        .handle(GatewayEvent::MemberUpdate {
            guild: GUILD,
            before: member(None, &[], false),
            after: member(Some("quiet"), &[], true),
        })
        .await;

    assert_eq!(bodies(&api), vec!["<@3000> was mute by <@4000>"]);
}

#[tokio::test]
async fn member_update_mute_without_audit_access_warns() {
    let api = Arc::new(MockGuildApi::new());
    api.deny_audit(GUILD);
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberUpdate {
            guild: GUILD,
            before: member(None, &[], true),
            after: member(None, &[], false),
        })
        .await;

    assert_eq!(bodies(&api), vec![AUDIT_UNAVAILABLE]);
}

#[tokio::test]
async fn voice_move_and_mute_are_merged() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, mute_audit(MEMBER, MOD, true));
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::VoiceStateUpdate {
            guild: GUILD,
            member: MEMBER,
            before: voice(Some((5, "Lounge")), false),
            after: voice(Some((6, "Stage")), true),
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec!["<@3000> voice channel changed from <#5> to <#6>, <@3000> was mute by <@4000>"]
    );
}

#[tokio::test]
async fn voice_mute_respects_mute_toggles() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, mute_audit(MEMBER, MOD, false));
    let relay = configured(&api);
    relay.stores().settings.toggle(EventKind::MemberMute);

    let unmute = GatewayEvent::VoiceStateUpdate {
        guild: GUILD,
        member: MEMBER,
        before: voice(Some((5, "Lounge")), true),
        after: voice(Some((5, "Lounge")), false),
    };

    // Unmute is still tracked while only mute is off.
    relay.handle(unmute.clone()).await;
    assert_eq!(bodies(&api), vec!["<@3000> was unmute by <@4000>"]);

    relay.stores().settings.toggle(EventKind::MemberUnmute);
    relay.handle(unmute).await;
    assert_eq!(api.sent().len(), 1);
}

#[tokio::test]
async fn voice_without_changes_emits_nothing() {
    let api = Arc::new(MockGuildApi::new());
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::VoiceStateUpdate {
            guild: GUILD,
            member: MEMBER,
            before: voice(Some((5, "Lounge")), false),
            after: voice(Some((5, "Lounge")), false),
        })
        .await;

    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn channel_lifecycle_records() {
    let api = Arc::new(MockGuildApi::new());
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::ChannelCreate {
            guild: GUILD,
            channel: text_channel(None),
        })
        .await;
    relay
        .handle(GatewayEvent::ChannelUpdate {
            guild: GUILD,
            before: text_channel(None),
            after: text_channel(Some("rules first")),
        })
        .await;
    relay
        .handle(GatewayEvent::ChannelDelete {
            guild: GUILD,
            channel: text_channel(None),
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec![
            "Channel created: <#77>",
            "Channel updated: <#77> -> Topic changed from None to rules first",
            "Channel deleted: general",
        ]
    );
}

#[tokio::test]
async fn invite_create_and_direct_kick() {
    let api = Arc::new(MockGuildApi::new());
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::InviteCreate {
            guild: GUILD,
            invite: invite("xyz", 0, MOD),
        })
        .await;
    relay
        .handle(GatewayEvent::MemberKick {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec![
            "Invite created: https://discord.gg/xyz by <@4000>",
            "<@3000> was kicked from the server.",
        ]
    );
}

#[tokio::test]
async fn double_toggle_restores_emission() {
    let api = Arc::new(MockGuildApi::new());
    let relay = configured(&api);
    let kick = GatewayEvent::MemberKick {
        guild: GUILD,
        member: MEMBER,
    };
    let toggle = GatewayEvent::Interaction {
        guild: GUILD,
        invoker: MOD,
        channel: None,
        command: Command::Toggle {
            event: EventKind::MemberKick,
        },
    };

    relay.handle(toggle.clone()).await;
    relay.handle(kick.clone()).await;
    assert!(api.sent().is_empty());

    relay.handle(toggle).await;
    relay.handle(kick).await;
    assert_eq!(bodies(&api), vec!["<@3000> was kicked from the server."]);
}

#[tokio::test]
async fn setchannellog_enables_logging_for_the_guild() {
    let api = Arc::new(MockGuildApi::new());
    api.allow_view(MOD, LOGS);
    let relay = correlator(&api);

    relay
        .handle(GatewayEvent::Interaction {
            guild: GUILD,
            invoker: MOD,
            channel: Some(LOGS),
            command: Command::SetChannelLog { channel: LOGS },
        })
        .await;
    relay
        .handle(GatewayEvent::MemberKick {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec!["Log channel set to <#2000>", "<@3000> was kicked from the server."]
    );
}

#[tokio::test]
async fn guild_create_seeds_members_and_prompts_for_setup() {
    let api = Arc::new(MockGuildApi::new());
    api.set_members(GUILD, vec![MEMBER, MOD]);
    let relay = correlator(&api);

    relay
        .handle(GatewayEvent::GuildCreate {
            guild: GUILD,
            system_channel: Some(ChannelId(1)),
        })
        .await;

    assert_eq!(api.sent(), vec![(ChannelId(1), ONBOARDING_PROMPT.to_string())]);
    assert_eq!(relay.stores().first_seen.known_count(GUILD), 2);
    assert!(!relay.stores().first_seen.observe_join(GUILD, MOD));
}

#[tokio::test]
async fn join_records_survive_unreadable_invites() {
    let api = Arc::new(MockGuildApi::new());
    api.deny_invites(GUILD);
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberJoin {
            guild: GUILD,
            member: MEMBER,
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec![
            "<@3000> has joined the server.",
            "<@3000> has joined the server for the first time.",
        ]
    );
}

#[tokio::test]
async fn voice_move_keeps_its_part_when_audit_log_is_unreadable() {
    let api = Arc::new(MockGuildApi::new());
    api.deny_audit(GUILD);
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::VoiceStateUpdate {
            guild: GUILD,
            member: MEMBER,
            before: voice(Some((5, "Lounge")), false),
            after: voice(Some((6, "Stage")), true),
        })
        .await;

    assert_eq!(
        bodies(&api),
        vec![format!(
            "<@3000> voice channel changed from <#5> to <#6>, {AUDIT_UNAVAILABLE}"
        )]
    );
}

#[tokio::test]
async fn member_update_mute_without_audit_entry_emits_nothing() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, audit(AuditAction::MemberUpdate, UserId(1), MOD));
    let relay = configured(&api);

    relay
        .handle(GatewayEvent::MemberUpdate {
            guild: GUILD,
            before: member(None, &[], false),
            after: member(None, &[], true),
        })
        .await;

    assert_eq!(api.audit_queries().len(), 1);
    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn voice_records_are_labelled_by_what_changed() {
    let api = Arc::new(MockGuildApi::new());
    api.push_audit(GUILD, mute_audit(MEMBER, MOD, false));
    let recorder = RecordingOutput::default();
    let config = config();
    let relay = EventCorrelator::new(
        api.clone(),
        Stores::from_config(&config),
        &config,
        OutputManager::with_handlers(vec![Box::new(recorder.clone())]),
    );
    relay.stores().guilds.set_log_channel(GUILD, LOGS);

    relay
        .handle(GatewayEvent::VoiceStateUpdate {
            guild: GUILD,
            member: MEMBER,
            before: voice(Some((5, "Lounge")), true),
            after: voice(Some((5, "Lounge")), false),
        })
        .await;
    relay
        .handle(GatewayEvent::VoiceStateUpdate {
            guild: GUILD,
            member: MEMBER,
            before: voice(Some((5, "Lounge")), false),
            after: voice(Some((6, "Stage")), false),
        })
        .await;

    assert_eq!(
        recorder.kinds(),
        vec![EventKind::MemberUnmute, EventKind::VoiceStateUpdate]
    );
}
