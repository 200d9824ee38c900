//! Guild entities as seen by the reconciliation logic.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildSummary {
    pub id: String,
    pub name: String,
    pub approximate_member_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: String,
    /// `None` when the API omits the join time.
    pub joined_at: Option<DateTime<Utc>>,
    pub is_bot: bool,
}

/// Channel types, mapped from Discord's numeric `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Announcement,
    AnnouncementThread,
    PublicThread,
    PrivateThread,
    Stage,
    Forum,
    Media,
    Other(u8),
}

impl ChannelKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Text,
            2 => Self::Voice,
            4 => Self::Category,
            5 => Self::Announcement,
            10 => Self::AnnouncementThread,
            11 => Self::PublicThread,
            12 => Self::PrivateThread,
            13 => Self::Stage,
            15 => Self::Forum,
            16 => Self::Media,
            other => Self::Other(other),
        }
    }

    /// Plain text and forum channels; the only kinds scanned for activity.
    pub fn is_messageable(self) -> bool {
        matches!(self, Self::Text | Self::Forum)
    }

    /// Kinds holding messages directly. Forum and media posts live
    /// exclusively in threads.
    pub fn has_own_messages(self) -> bool {
        matches!(self, Self::Text | Self::Announcement | Self::Voice | Self::Stage)
    }

    pub fn supports_threads(self) -> bool {
        matches!(self, Self::Text | Self::Forum | Self::Announcement | Self::Media)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    /// Top-level channel, also for messages posted inside one of its threads.
    pub channel_id: String,
    pub thread_id: Option<String>,
    pub author_id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub reactions: Vec<Reaction>,
    /// Set on overlays rebuilt from message-delete audit entries.
    pub deleted: bool,
}

impl Message {
    pub fn reaction_total(&self) -> u64 {
        self.reactions.iter().map(|r| r.count).sum()
    }
}

/// Audit-log action types the collector reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    MemberKick,
    MemberBanAdd,
    MemberUpdate,
    MessageDelete,
}

impl AuditAction {
    pub fn code(self) -> u16 {
        match self {
            Self::MemberKick => 20,
            Self::MemberBanAdd => 22,
            Self::MemberUpdate => 24,
            Self::MessageDelete => 72,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            20 => Some(Self::MemberKick),
            22 => Some(Self::MemberBanAdd),
            24 => Some(Self::MemberUpdate),
            72 => Some(Self::MessageDelete),
            _ => None,
        }
    }

    /// Actions that remove a member from the guild.
    pub fn is_leave(self) -> bool {
        matches!(self, Self::MemberKick | Self::MemberBanAdd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub id: String,
    pub action: AuditAction,
    pub target_id: Option<String>,
    /// The user who performed the action.
    pub user_id: Option<String>,
    /// Decoded from the entry's snowflake id.
    pub created_at: DateTime<Utc>,
    /// Message deletes only: channel the messages were removed from.
    pub channel_id: Option<String>,
    /// Message deletes only: how many messages this entry stands for.
    pub count: Option<u64>,
}
