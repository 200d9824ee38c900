//! Discord JSON payloads and their mapping onto core models.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use guildpulse_core::{
    model::{AuditAction, AuditLogEntry, Channel, ChannelKind, GuildSummary, Member, Message, Reaction},
    snowflake::timestamp_of,
};

#[derive(Debug, Deserialize)]
pub(crate) struct WireGuild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub approximate_member_count: Option<u64>,
}

impl From<WireGuild> for GuildSummary {
    fn from(guild: WireGuild) -> Self {
        Self {
            id: guild.id,
            name: guild.name,
            approximate_member_count: guild.approximate_member_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMember {
    pub user: Option<WireUser>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

impl WireMember {
    pub fn into_member(self) -> Option<Member> {
        let user = self.user?;
        Some(Member {
            user_id: user.id,
            joined_at: self.joined_at,
            is_bot: user.bot,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireThreadMetadata {
    #[serde(default)]
    pub archived: bool,
    /// Last change of the archived flag; creation time for never-archived threads.
    pub archive_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChannel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub thread_metadata: Option<WireThreadMetadata>,
}

impl WireChannel {
    pub fn archive_timestamp(&self) -> Option<DateTime<Utc>> {
        self.thread_metadata
            .as_ref()
            .and_then(|m| m.archive_timestamp)
    }

    /// When the thread was archived; `None` while it is still active.
    pub fn archived_at(&self) -> Option<DateTime<Utc>> {
        self.thread_metadata
            .as_ref()
            .filter(|m| m.archived)
            .and_then(|m| m.archive_timestamp)
    }
}

impl From<WireChannel> for Channel {
    fn from(channel: WireChannel) -> Self {
        Self {
            id: channel.id,
            name: channel.name.unwrap_or_default(),
            kind: ChannelKind::from_code(channel.kind),
            parent_id: channel.parent_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireThreadList {
    #[serde(default)]
    pub threads: Vec<WireChannel>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireEmoji {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireReaction {
    pub count: u64,
    pub emoji: WireEmoji,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    pub id: String,
    pub author: WireUser,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reactions: Vec<WireReaction>,
}

impl WireMessage {
    pub fn into_message(self, channel_id: &str, thread_id: Option<&str>) -> Message {
        Message {
            id: self.id,
            channel_id: channel_id.to_string(),
            thread_id: thread_id.map(str::to_string),
            author_id: self.author.id,
            timestamp: self.timestamp,
            content: self.content,
            reactions: self
                .reactions
                .into_iter()
                .map(|r| Reaction {
                    emoji: r.emoji.name.or(r.emoji.id).unwrap_or_default(),
                    count: r.count,
                })
                .collect(),
            deleted: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAuditOptions {
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Sent as a string by Discord.
    #[serde(default)]
    pub count: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAuditEntry {
    pub id: String,
    pub action_type: u16,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub options: Option<WireAuditOptions>,
}

impl WireAuditEntry {
    /// `None` for action types the collector does not read or unparsable ids.
    pub fn into_entry(self) -> Option<AuditLogEntry> {
        let action = AuditAction::from_code(self.action_type)?;
        let created_at = timestamp_of(&self.id).ok()?;
        let (channel_id, count) = match self.options {
            Some(options) => (
                options.channel_id,
                options.count.and_then(|c| c.trim().parse().ok()),
            ),
            None => (None, None),
        };
        Some(AuditLogEntry {
            id: self.id,
            action,
            target_id: self.target_id,
            user_id: self.user_id,
            created_at,
            channel_id,
            count,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAuditLog {
    #[serde(default)]
    pub audit_log_entries: Vec<WireAuditEntry>,
}
