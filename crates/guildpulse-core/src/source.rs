//! Guild data source abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    model::{AuditAction, AuditLogEntry, Channel, GuildSummary, Member, Message},
    window::ReportWindow,
};

/// Read access to one guild's live state and history.
///
/// The Discord REST client implements this; tests substitute in-memory
/// fixtures so reconciliation can run without network access.
#[async_trait]
pub trait CommunitySource: Send + Sync + 'static {
    async fn guild_summary(&self) -> anyhow::Result<GuildSummary>;

    /// Every current member of the guild.
    async fn members(&self) -> anyhow::Result<Vec<Member>>;

    async fn channels(&self) -> anyhow::Result<Vec<Channel>>;

    /// Threads of the whole guild that are not archived, listed once per job.
    async fn active_threads(&self) -> anyhow::Result<Vec<Channel>> {
        Ok(Vec::new())
    }

    /// Messages of `channel` (and its threads, when enabled) inside `window`.
    ///
    /// `active_threads` is the guild-wide listing from
    /// [`CommunitySource::active_threads`]. Implementations isolate failures of
    /// individual threads; an error here means the channel itself could not be
    /// read.
    async fn window_messages(
        &self,
        channel: &Channel,
        active_threads: &[Channel],
        window: &ReportWindow,
    ) -> anyhow::Result<Vec<Message>>;

    /// Audit-log entries of `action` created at or after `since`.
    async fn audit_entries(
        &self,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AuditLogEntry>>;
}
