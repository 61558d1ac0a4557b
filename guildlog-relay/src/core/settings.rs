/*!
Process-wide on/off switches for each kind of relayed event
*/

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Kinds of events that can be toggled. Declaration order is menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MemberJoin,
    MemberRemove,
    MemberUpdate,
    VoiceStateUpdate,
    ChannelCreate,
    ChannelDelete,
    ChannelUpdate,
    InviteCreate,
    MemberKick,
    MemberMute,
    MemberUnmute,
    FirstTimeJoin,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        Self::MemberJoin,
        Self::MemberRemove,
        Self::MemberUpdate,
        Self::VoiceStateUpdate,
        Self::ChannelCreate,
        Self::ChannelDelete,
        Self::ChannelUpdate,
        Self::InviteCreate,
        Self::MemberKick,
        Self::MemberMute,
        Self::MemberUnmute,
        Self::FirstTimeJoin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MemberJoin => "member_join",
            Self::MemberRemove => "member_remove",
            Self::MemberUpdate => "member_update",
            Self::VoiceStateUpdate => "voice_state_update",
            Self::ChannelCreate => "channel_create",
            Self::ChannelDelete => "channel_delete",
            Self::ChannelUpdate => "channel_update",
            Self::InviteCreate => "invite_create",
            Self::MemberKick => "member_kick",
            Self::MemberMute => "member_mute",
            Self::MemberUnmute => "member_unmute",
            Self::FirstTimeJoin => "first_time_join",
        }
    }

    /// Human label: `member_join` becomes `Member Join`.
    pub fn label(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct ParseEventKindError(pub String);

impl FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEventKindError(s.to_string()))
    }
}

/// Toggle table shared by every guild. Everything starts enabled.
pub struct EventSettingsStore {
    enabled: RwLock<[bool; EventKind::ALL.len()]>,
}

impl Default for EventSettingsStore {
    fn default() -> Self {
        Self {
            enabled: RwLock::new([true; EventKind::ALL.len()]),
        }
    }
}

impl EventSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with every kind enabled except `disabled`.
    pub fn with_disabled(disabled: &[EventKind]) -> Self {
        let store = Self::default();
        {
            let mut enabled = store.enabled.write().unwrap_or_else(PoisonError::into_inner);
            for kind in disabled {
                enabled[kind.index()] = false;
            }
        }
        store
    }

    pub fn is_enabled(&self, kind: EventKind) -> bool {
        self.enabled.read().unwrap_or_else(PoisonError::into_inner)[kind.index()]
    }

    /// Flip one switch and return its new state.
    pub fn toggle(&self, kind: EventKind) -> bool {
        let mut enabled = self.enabled.write().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut enabled[kind.index()];
        *slot = !*slot;
        *slot
    }

    /// Every kind with its current state, in menu order.
    pub fn snapshot(&self) -> Vec<(EventKind, bool)> {
        let enabled = self.enabled.read().unwrap_or_else(PoisonError::into_inner);
        EventKind::ALL
            .into_iter()
            .map(|kind| (kind, enabled[kind.index()]))
            .collect()
    }
}
