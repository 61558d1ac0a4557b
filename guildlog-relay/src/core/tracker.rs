/*!
Event correlator and the async loop that feeds it
*/

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use guildlog_platform::{
    ChannelId, GuildApi, GuildChannel, GuildId, Invite, Member, UserId, VoiceState,
};
use tokio::task::JoinSet;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::core::{
    commands::{Command, CommandCenter},
    config::RelayConfig,
    detection_engine::{Attribution, AuditAttributor},
    event_system::GatewayEvent,
    invites::InviteUsageTracker,
    output_plugins::OutputManager,
    records::{self, LogRecord, RecordFormatter},
    settings::{EventKind, EventSettingsStore},
    state_manager::{FirstSeenTracker, GuildConfigStore},
};
use crate::error::RelayError;

/// Mutable state shared by every handler.
#[derive(Clone, Default)]
pub struct Stores {
    pub settings: Arc<EventSettingsStore>,
    pub guilds: Arc<GuildConfigStore>,
    pub first_seen: Arc<FirstSeenTracker>,
}

impl Stores {
    /// Toggles and log channels as given in the configuration file.
    pub fn from_config(config: &RelayConfig) -> Self {
        let guilds = GuildConfigStore::new();
        for entry in &config.log_channels {
            guilds.set_log_channel(entry.guild, entry.channel);
        }
        Self {
            settings: Arc::new(EventSettingsStore::with_disabled(&config.events.disabled)),
            guilds: Arc::new(guilds),
            first_seen: Arc::new(FirstSeenTracker::new()),
        }
    }
}

/// Turns gateway events into log records. Handlers share nothing but the
/// stores, so events from different guilds can be processed concurrently.
pub struct EventCorrelator {
    api: Arc<dyn GuildApi>,
    stores: Stores,
    invites: InviteUsageTracker,
    audit: AuditAttributor,
    commands: CommandCenter,
    formatter: RecordFormatter,
    outputs: OutputManager,
}

impl EventCorrelator {
    pub fn new(
        api: Arc<dyn GuildApi>,
        stores: Stores,
        config: &RelayConfig,
        outputs: OutputManager,
    ) -> Self {
        Self {
            invites: InviteUsageTracker::new(
                api.clone(),
                Duration::from_millis(config.relay.invite_settle_ms),
            ),
            audit: AuditAttributor::new(api.clone(), config.audit),
            commands: CommandCenter::new(
                stores.settings.clone(),
                stores.guilds.clone(),
                api.clone(),
            ),
            formatter: RecordFormatter::new(config.relay.timestamp_format.clone()),
            api,
            stores,
            outputs,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn outputs(&self) -> &OutputManager {
        &self.outputs
    }

    /// Dispatch one event to its handler.
    pub async fn handle(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { guilds } => self.on_ready(&guilds).await,
            GatewayEvent::GuildCreate {
                guild,
                system_channel,
            } => self.on_guild_create(guild, system_channel).await,
            GatewayEvent::MemberJoin { guild, member } => self.on_member_join(guild, member).await,
            GatewayEvent::MemberRemove { guild, member } => {
                self.on_member_remove(guild, member).await
            }
            GatewayEvent::MemberUpdate {
                guild,
                before,
                after,
            } => self.on_member_update(guild, &before, &after).await,
            GatewayEvent::VoiceStateUpdate {
                guild,
                member,
                before,
                after,
            } => self.on_voice_state_update(guild, member, &before, &after).await,
            GatewayEvent::ChannelCreate { guild, channel } => {
                self.on_channel_create(guild, &channel).await
            }
            GatewayEvent::ChannelDelete { guild, channel } => {
                self.on_channel_delete(guild, &channel).await
            }
            GatewayEvent::ChannelUpdate {
                guild,
                before,
                after,
            } => self.on_channel_update(guild, &before, &after).await,
            GatewayEvent::InviteCreate { guild, invite } => {
                self.on_invite_create(guild, &invite).await
            }
            GatewayEvent::MemberKick { guild, member } => self.on_member_kick(guild, member).await,
            GatewayEvent::Interaction {
                guild,
                invoker,
                channel,
                command,
            } => self.on_interaction(guild, invoker, channel, &command).await,
        }
    }

    fn enabled(&self, kind: EventKind) -> bool {
        self.stores.settings.is_enabled(kind)
    }

    fn log_channel(&self, guild: GuildId) -> Option<ChannelId> {
        let channel = self.stores.guilds.log_channel(guild);
        if channel.is_none() {
            debug!("No log channel configured for guild {}", guild);
        }
        channel
    }

    /// Log channel for `kind` if the toggle is on and a channel is configured.
    fn gated_channel(&self, guild: GuildId, kind: EventKind) -> Option<ChannelId> {
        if !self.enabled(kind) {
            debug!("{} is switched off", kind);
            return None;
        }
        self.log_channel(guild)
    }

    async fn emit(&self, guild: GuildId, channel: ChannelId, kind: EventKind, body: String) {
        let record: LogRecord = self.formatter.record(guild, channel, kind, body);
        debug!("Emitting {} record for guild {}", kind, guild);
        self.outputs.handle_record(&record).await;
    }

    async fn seed_guild(&self, guild: GuildId) {
        match self.api.list_members(guild).await {
            Ok(members) => self.stores.first_seen.seed(guild, members),
            Err(e) => warn!("Could not list members of guild {}: {}", guild, e),
        }
    }

    async fn on_ready(&self, guilds: &[GuildId]) {
        info!("Gateway ready with {} guilds", guilds.len());
        join_all(guilds.iter().map(|guild| self.seed_guild(*guild))).await;
    }

    async fn on_guild_create(&self, guild: GuildId, system_channel: Option<ChannelId>) {
        info!("Joined guild {}", guild);
        self.seed_guild(guild).await;

        if let Some(channel) = system_channel {
            if let Err(e) = self.api.send_message(channel, records::ONBOARDING_PROMPT).await {
                warn!("Could not post setup prompt in guild {}: {}", guild, e);
            }
        }
    }

    async fn on_member_join(&self, guild: GuildId, member: UserId) {
        let channel = self.log_channel(guild);

        // Taken before anything else so the join has the best chance of
        // landing between the two invite listings.
        let invites_before = match channel {
            Some(_) => match self.invites.capture(guild).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Cannot list invites for guild {}: {}", guild, e);
                    None
                }
            },
            None => None,
        };

        if let Some(channel) = self.gated_channel(guild, EventKind::MemberJoin) {
            self.emit(guild, channel, EventKind::MemberJoin, records::joined(member))
                .await;
        }

        let first_time = self.stores.first_seen.observe_join(guild, member);
        if first_time {
            if let Some(channel) = self.gated_channel(guild, EventKind::FirstTimeJoin) {
                self.emit(
                    guild,
                    channel,
                    EventKind::FirstTimeJoin,
                    records::first_time_join(member),
                )
                .await;
            }
        }

        if let (Some(channel), Some(before)) = (channel, invites_before) {
            if let Some(credit) = self.invites.attribute_join(guild, &before).await {
                self.emit(
                    guild,
                    channel,
                    EventKind::MemberJoin,
                    records::joined_via_invite(member, &credit),
                )
                .await;
            }
        }
    }

    async fn on_member_remove(&self, guild: GuildId, member: UserId) {
        let Some(channel) = self.gated_channel(guild, EventKind::MemberRemove) else {
            return;
        };
        let removal = self.audit.resolve_removal(guild, member).await;
        self.emit(
            guild,
            channel,
            EventKind::MemberRemove,
            records::removal(member, removal),
        )
        .await;
    }

    async fn on_member_update(&self, guild: GuildId, before: &Member, after: &Member) {
        if let Some(channel) = self.gated_channel(guild, EventKind::MemberUpdate) {
            let changes = records::member_changes(before, after);
            if !changes.is_empty() {
                self.emit(
                    guild,
                    channel,
                    EventKind::MemberUpdate,
                    records::member_updated(after.id, &changes),
                )
                .await;
            }
        }

        // Mute attribution on member updates ignores every toggle.
        if before.mute == after.mute {
            return;
        }
        let Some(channel) = self.log_channel(guild) else {
            return;
        };
        let kind = mute_kind(after.mute);
        match self.audit.find_mute_actor(guild, after.id).await {
            Attribution::Found(actor) => {
                self.emit(guild, channel, kind, records::mute_changed(after.id, after.mute, actor))
                    .await
            }
            Attribution::Missing => {
                debug!("No audit entry for mute change of {} in guild {}", after.id, guild)
            }
            Attribution::Unavailable => {
                self.emit(guild, channel, kind, records::AUDIT_UNAVAILABLE.to_string())
                    .await
            }
        }
    }

    async fn on_voice_state_update(
        &self,
        guild: GuildId,
        member: UserId,
        before: &VoiceState,
        after: &VoiceState,
    ) {
        let Some(channel) = self.log_channel(guild) else {
            return;
        };
        let mut parts = Vec::new();
        let mut moved = false;

        if self.enabled(EventKind::VoiceStateUpdate) {
            if let Some(change) = records::voice_channel_change(
                member,
                before.channel.as_ref(),
                after.channel.as_ref(),
            ) {
                parts.push(change);
                moved = true;
            }
        }

        let mute_tracked =
            self.enabled(EventKind::MemberMute) || self.enabled(EventKind::MemberUnmute);
        if mute_tracked && before.mute != after.mute {
            match self.audit.find_mute_actor(guild, member).await {
                Attribution::Found(actor) => {
                    parts.push(records::mute_changed(member, after.mute, actor))
                }
                Attribution::Missing => {
                    debug!("No audit entry for voice mute of {} in guild {}", member, guild)
                }
                Attribution::Unavailable => parts.push(records::AUDIT_UNAVAILABLE.to_string()),
            }
        }

        if !parts.is_empty() {
            // A mute-only update is labelled as the mute itself.
            let kind = if moved {
                EventKind::VoiceStateUpdate
            } else {
                mute_kind(after.mute)
            };
            self.emit(guild, channel, kind, parts.join(", ")).await;
        }
    }

    async fn on_channel_create(&self, guild: GuildId, created: &GuildChannel) {
        if let Some(channel) = self.gated_channel(guild, EventKind::ChannelCreate) {
            self.emit(
                guild,
                channel,
                EventKind::ChannelCreate,
                records::channel_created(created),
            )
            .await;
        }
    }

    async fn on_channel_delete(&self, guild: GuildId, deleted: &GuildChannel) {
        if let Some(channel) = self.gated_channel(guild, EventKind::ChannelDelete) {
            self.emit(
                guild,
                channel,
                EventKind::ChannelDelete,
                records::channel_deleted(deleted),
            )
            .await;
        }
    }

    async fn on_channel_update(&self, guild: GuildId, before: &GuildChannel, after: &GuildChannel) {
        let Some(channel) = self.gated_channel(guild, EventKind::ChannelUpdate) else {
            return;
        };
        let changes = records::channel_changes(before, after);
        if changes.is_empty() {
            return;
        }
        self.emit(
            guild,
            channel,
            EventKind::ChannelUpdate,
            records::channel_updated(before.id, &changes),
        )
        .await;
    }

    async fn on_invite_create(&self, guild: GuildId, invite: &Invite) {
        if let Some(channel) = self.gated_channel(guild, EventKind::InviteCreate) {
            self.emit(
                guild,
                channel,
                EventKind::InviteCreate,
                records::invite_created(invite),
            )
            .await;
        }
    }

    async fn on_member_kick(&self, guild: GuildId, member: UserId) {
        if let Some(channel) = self.gated_channel(guild, EventKind::MemberKick) {
            self.emit(guild, channel, EventKind::MemberKick, records::member_kicked(member))
                .await;
        }
    }

    async fn on_interaction(
        &self,
        guild: GuildId,
        invoker: UserId,
        channel: Option<ChannelId>,
        command: &Command,
    ) {
        let reply = self.commands.execute(guild, invoker, command).await;
        info!("Command {:?} from {} in guild {}: {}", command, invoker, guild, reply);

        if let Some(channel) = channel {
            let text = self.formatter.stamp(&reply);
            if let Err(e) = self.api.send_message(channel, &text).await {
                warn!("Could not reply to {} in guild {}: {}", invoker, guild, e);
            }
        }
    }
}

fn mute_kind(muted: bool) -> EventKind {
    if muted {
        EventKind::MemberMute
    } else {
        EventKind::MemberUnmute
    }
}

/// Main relay loop: one task per event so the invite settle wait never holds
/// up other guilds.
pub struct RelayService {
    correlator: Arc<EventCorrelator>,
}

impl RelayService {
    pub fn new(correlator: EventCorrelator) -> Self {
        Self {
            correlator: Arc::new(correlator),
        }
    }

    pub fn correlator(&self) -> &Arc<EventCorrelator> {
        &self.correlator
    }

    /// Process events until the stream ends, then wait for in-flight handlers.
    pub async fn run<S>(&self, events: S) -> Result<RelayStats, RelayError>
    where
        S: Stream<Item = Result<GatewayEvent, RelayError>>,
    {
        self.run_until(events, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stops reading events once `shutdown`
    /// completes. Handlers already started are still awaited.
    pub async fn run_until<S, F>(&self, events: S, shutdown: F) -> Result<RelayStats, RelayError>
    where
        S: Stream<Item = Result<GatewayEvent, RelayError>>,
        F: Future<Output = ()>,
    {
        info!("Relay started");
        let mut events = Box::pin(events);
        let mut shutdown = Box::pin(shutdown);
        let mut tasks = JoinSet::new();
        let mut stats = RelayStats::default();

        loop {
            let item = tokio::select! {
                item = events.next() => item,
                _ = &mut shutdown => {
                    info!("Shutdown requested, waiting for {} in-flight events", tasks.len());
                    break;
                }
            };
            let Some(item) = item else {
                break;
            };

            match item {
                Ok(event) => {
                    stats.events_processed += 1;
                    let correlator = self.correlator.clone();
                    tasks.spawn(async move { correlator.handle(event).await });
                }
                Err(RelayError::Source(e)) => {
                    error!("Event source failed: {}", e);
                    break;
                }
                Err(e) => {
                    stats.events_rejected += 1;
                    error!("Skipping event: {}", e);
                }
            }

            while let Some(done) = tasks.try_join_next() {
                record_task_result(done, &mut stats);
            }
        }

        while let Some(done) = tasks.join_next().await {
            record_task_result(done, &mut stats);
        }

        self.correlator.outputs().finalize().await?;
        info!(
            "Relay stopped after {} events ({} rejected, {} failed)",
            stats.events_processed, stats.events_rejected, stats.handler_failures
        );
        Ok(stats)
    }
}

fn record_task_result(result: Result<(), tokio::task::JoinError>, stats: &mut RelayStats) {
    if let Err(e) = result {
        stats.handler_failures += 1;
        error!("Event handler failed: {}", e);
    }
}

/// Counters reported when the relay stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub events_processed: u64,
    pub events_rejected: u64,
    pub handler_failures: u64,
}
