use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use guildpulse_core::{
    config::{AuditLogTermination, Config},
    model::{AuditAction, AuditLogEntry, Channel, GuildSummary, Member, Message},
    source::CommunitySource,
    window::ReportWindow,
};

use crate::{
    client::{DiscordClient, RetryPolicy},
    error::DiscordError,
};

/// [`CommunitySource`] backed by the Discord REST API for one guild.
pub struct DiscordSource {
    client: DiscordClient,
    guild_id: String,
    include_threads: bool,
    member_page_delay: Duration,
    audit_termination: AuditLogTermination,
}

impl DiscordSource {
    pub fn new(client: DiscordClient, guild_id: &str) -> Self {
        Self {
            client,
            guild_id: guild_id.to_string(),
            include_threads: true,
            member_page_delay: Duration::from_secs(1),
            audit_termination: AuditLogTermination::default(),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, DiscordError> {
        let client = DiscordClient::new(
            &cfg.discord_api_base,
            &cfg.discord_token,
            RetryPolicy::with_max_retries(cfg.max_rate_limit_retries),
        )?;
        Ok(Self::new(client, &cfg.guild_id)
            .with_threads(cfg.include_threads)
            .with_member_page_delay(cfg.member_page_delay())
            .with_audit_termination(cfg.audit_termination))
    }

    pub fn with_threads(mut self, include_threads: bool) -> Self {
        self.include_threads = include_threads;
        self
    }

    pub fn with_member_page_delay(mut self, delay: Duration) -> Self {
        self.member_page_delay = delay;
        self
    }

    pub fn with_audit_termination(mut self, termination: AuditLogTermination) -> Self {
        self.audit_termination = termination;
        self
    }
}

#[async_trait]
impl CommunitySource for DiscordSource {
    async fn guild_summary(&self) -> anyhow::Result<GuildSummary> {
        Ok(self.client.guild_summary(&self.guild_id).await?)
    }

    async fn members(&self) -> anyhow::Result<Vec<Member>> {
        Ok(self
            .client
            .list_members(&self.guild_id, self.member_page_delay)
            .await?)
    }

    async fn channels(&self) -> anyhow::Result<Vec<Channel>> {
        Ok(self.client.list_channels(&self.guild_id).await?)
    }

    async fn active_threads(&self) -> anyhow::Result<Vec<Channel>> {
        if !self.include_threads {
            return Ok(Vec::new());
        }
        Ok(self.client.active_threads(&self.guild_id).await?)
    }

    async fn window_messages(
        &self,
        channel: &Channel,
        active_threads: &[Channel],
        window: &ReportWindow,
    ) -> anyhow::Result<Vec<Message>> {
        let mut messages = Vec::new();
        if channel.kind.has_own_messages() {
            messages.extend(
                self.client
                    .window_messages(&channel.id, &channel.id, None, window)
                    .await,
            );
        }
        if self.include_threads && channel.kind.supports_threads() {
            let threads = self
                .client
                .window_threads(channel, active_threads, window)
                .await;
            for thread in &threads {
                messages.extend(
                    self.client
                        .window_messages(&thread.id, &channel.id, Some(&thread.id), window)
                        .await,
                );
            }
            debug!(
                channel_id = %channel.id,
                threads = threads.len(),
                "Scanned channel threads"
            );
        }
        Ok(messages)
    }

    async fn audit_entries(
        &self,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AuditLogEntry>> {
        Ok(self
            .client
            .audit_entries(&self.guild_id, action, since, self.audit_termination)
            .await?)
    }
}
