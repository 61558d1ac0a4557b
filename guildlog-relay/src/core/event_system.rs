/*!
Gateway event representation and the JSON-lines source that feeds it
*/

use std::path::Path;

use guildlog_platform::{ChannelId, GuildChannel, GuildId, Invite, Member, UserId, VoiceState};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::Stream;
use tracing::{debug, info};

use crate::core::commands::Command;
use crate::error::RelayError;

/// Lifecycle events delivered by the gateway, tagged by `"t"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Connection established; lists every guild the bot is in.
    Ready { guilds: Vec<GuildId> },
    /// The bot was added to a guild.
    GuildCreate {
        guild: GuildId,
        #[serde(default)]
        system_channel: Option<ChannelId>,
    },
    MemberJoin { guild: GuildId, member: UserId },
    MemberRemove { guild: GuildId, member: UserId },
    MemberUpdate {
        guild: GuildId,
        before: Member,
        after: Member,
    },
    VoiceStateUpdate {
        guild: GuildId,
        member: UserId,
        before: VoiceState,
        after: VoiceState,
    },
    ChannelCreate { guild: GuildId, channel: GuildChannel },
    ChannelDelete { guild: GuildId, channel: GuildChannel },
    ChannelUpdate {
        guild: GuildId,
        before: GuildChannel,
        after: GuildChannel,
    },
    InviteCreate { guild: GuildId, invite: Invite },
    MemberKick { guild: GuildId, member: UserId },
    /// A slash command invocation.
    Interaction {
        guild: GuildId,
        invoker: UserId,
        #[serde(default)]
        channel: Option<ChannelId>,
        command: Command,
    },
}

pub fn parse_event(line: &str) -> Result<GatewayEvent, RelayError> {
    Ok(serde_json::from_str(line)?)
}

/// Reads one JSON event per line. Blank lines and `#` comments are skipped.
pub struct EventSource<R> {
    reader: R,
}

impl EventSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl EventSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        info!("Replaying events from {:?}", path.as_ref());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R> EventSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Parsed events in arrival order. A malformed line yields an error item
    /// and the stream carries on; an I/O error ends it.
    pub fn into_stream(self) -> impl Stream<Item = Result<GatewayEvent, RelayError>> + Send {
        let mut lines = self.reader.lines();

        async_stream::stream! {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        yield parse_event(line);
                    }
                    Ok(None) => {
                        debug!("Event source exhausted");
                        break;
                    }
                    Err(e) => {
                        yield Err(RelayError::Source(e));
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::EventKind;
    use tokio_stream::StreamExt;

    #[test]
    fn parses_member_update() {
        let event = parse_event(
            r#"{"t":"member_update","guild":"1","before":{"id":"2","nick":null},"after":{"id":"2","nick":"x"}}"#,
        )
        .unwrap();
        match event {
            GatewayEvent::MemberUpdate { guild, before, after } => {
                assert_eq!(guild, GuildId(1));
                assert_eq!(before.nick, None);
                assert_eq!(after.nick.as_deref(), Some("x"));
                assert!(after.roles.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn parses_interaction_commands() {
        let event = parse_event(
            r#"{"t":"interaction","guild":1,"invoker":2,"command":{"name":"toggle","event":"member_join"}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            GatewayEvent::Interaction {
                command: Command::Toggle {
                    event: EventKind::MemberJoin
                },
                ..
            }
        ));
    }

    #[test]
    fn unknown_event_type_is_malformed() {
        assert!(matches!(
            parse_event(r#"{"t":"typing_start","guild":"1"}"#),
            Err(RelayError::MalformedEvent(_))
        ));
    }

    #[tokio::test]
    async fn stream_skips_noise_and_survives_bad_lines() {
        let input: &'static [u8] = b"# replay\n\n{\"t\":\"member_kick\",\"guild\":\"1\",\"member\":\"2\"}\nnot json\n{\"t\":\"ready\",\"guilds\":[\"1\"]}\n";
        let items: Vec<_> = EventSource::new(input).into_stream().collect().await;

        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], Ok(GatewayEvent::MemberKick { .. })));
        assert!(items[1].is_err());
        assert!(matches!(items[2], Ok(GatewayEvent::Ready { .. })));
    }
}
