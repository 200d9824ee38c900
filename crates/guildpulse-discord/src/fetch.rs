//! Paginated collection fetchers.
//!
//! Members page forward by user id, messages and audit-log entries page
//! backwards (newest first) by snowflake, archived threads page backwards by
//! archive timestamp. Rate-limit exhaustion on a single page doubles a local
//! backoff and retries that page a few times; any other failure ends the
//! scan of that source with whatever was collected so far.

use std::{collections::HashSet, time::Duration};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use guildpulse_core::{
    config::AuditLogTermination,
    model::{AuditAction, AuditLogEntry, Channel, GuildSummary, Member, Message},
    snowflake::{snowflake_at, timestamp_of},
    window::{ReportWindow, WindowPosition},
};

use crate::{
    client::{DiscordClient, Forbidden},
    error::DiscordError,
    wire::{WireAuditEntry, WireAuditLog, WireChannel, WireGuild, WireMember, WireMessage, WireThreadList},
};

pub const MEMBER_PAGE_SIZE: usize = 1000;
pub const MESSAGE_PAGE_SIZE: usize = 100;
pub const AUDIT_PAGE_SIZE: usize = 100;
pub const THREAD_PAGE_SIZE: usize = 100;

/// Page-level retries after the client's own 429 handling gave up.
const PAGE_RETRIES: u32 = 3;

/// Result of classifying one newest-first page of messages against a window.
#[derive(Debug)]
pub(crate) struct MessageScan {
    pub kept: Vec<WireMessage>,
    /// A message older than the window start was seen; older pages are irrelevant.
    pub reached_start: bool,
}

pub(crate) fn scan_message_page(page: Vec<WireMessage>, window: &ReportWindow) -> MessageScan {
    let mut kept = Vec::new();
    for message in page {
        match window.position(message.timestamp) {
            WindowPosition::After => continue,
            WindowPosition::Within => kept.push(message),
            WindowPosition::Before => {
                return MessageScan {
                    kept,
                    reached_start: true,
                }
            }
        }
    }
    MessageScan {
        kept,
        reached_start: false,
    }
}

/// Keep entries created at or after `since`; report whether paging should stop.
pub(crate) fn scan_audit_page(
    page: Vec<AuditLogEntry>,
    since: DateTime<Utc>,
    termination: AuditLogTermination,
) -> (Vec<AuditLogEntry>, bool) {
    let total = page.len();
    let kept: Vec<AuditLogEntry> = page.into_iter().filter(|e| e.created_at >= since).collect();
    let stop = match termination {
        AuditLogTermination::EmptyPage => kept.is_empty(),
        AuditLogTermination::PartialPage => kept.len() < total,
    };
    (kept, stop)
}

impl DiscordClient {
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        forbidden: Forbidden,
    ) -> Result<Option<T>, DiscordError> {
        let mut backoff = self.retry_policy().initial_backoff;
        let mut page_retries = 0;
        loop {
            match self.get_json(path, query, forbidden).await {
                Ok(None) => return Ok(None),
                Ok(Some(value)) => {
                    return serde_json::from_value(value)
                        .map(Some)
                        .map_err(|source| DiscordError::Decode {
                            path: path.to_string(),
                            source,
                        })
                }
                Err(err) if err.is_rate_limited() && page_retries < PAGE_RETRIES => {
                    warn!(path, backoff_ms = backoff.as_millis() as u64, "Page still rate limited, backing off");
                    self.sleep(backoff).await;
                    backoff = backoff
                        .saturating_mul(2)
                        .min(self.retry_policy().max_backoff);
                    page_retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn guild_summary(&self, guild_id: &str) -> Result<GuildSummary, DiscordError> {
        let path = format!("/guilds/{guild_id}");
        let guild: Option<WireGuild> = self
            .fetch_page(&path, &[("with_counts", "true".to_string())], Forbidden::Fail)
            .await?;
        let guild = guild.ok_or_else(|| DiscordError::RemoteApi {
            status: 403,
            path,
            body: String::new(),
        })?;
        Ok(guild.into())
    }

    /// All current members, `MEMBER_PAGE_SIZE` per request with `page_delay` between pages.
    pub async fn list_members(
        &self,
        guild_id: &str,
        page_delay: Duration,
    ) -> Result<Vec<Member>, DiscordError> {
        let path = format!("/guilds/{guild_id}/members");
        let mut members = Vec::new();
        let mut after = "0".to_string();
        loop {
            let query = [
                ("limit", MEMBER_PAGE_SIZE.to_string()),
                ("after", after.clone()),
            ];
            let page: Vec<WireMember> = self
                .fetch_page(&path, &query, Forbidden::Fail)
                .await?
                .unwrap_or_default();
            let page_len = page.len();
            if let Some(last) = page.last().and_then(|m| m.user.as_ref()) {
                after = last.id.clone();
            }
            members.extend(page.into_iter().filter_map(WireMember::into_member));
            if page_len < MEMBER_PAGE_SIZE {
                break;
            }
            self.sleep(page_delay).await;
        }
        info!(guild_id, count = members.len(), "Fetched guild members");
        Ok(members)
    }

    pub async fn list_channels(&self, guild_id: &str) -> Result<Vec<Channel>, DiscordError> {
        let path = format!("/guilds/{guild_id}/channels");
        let channels: Vec<WireChannel> = self
            .fetch_page(&path, &[], Forbidden::Fail)
            .await?
            .unwrap_or_default();
        Ok(channels.into_iter().map(Channel::from).collect())
    }

    /// In-window messages of one channel or thread.
    ///
    /// `root_channel_id` is recorded on every message so thread messages stay
    /// attributable to their parent. Failures are logged and end the scan.
    pub async fn window_messages(
        &self,
        source_id: &str,
        root_channel_id: &str,
        thread_id: Option<&str>,
        window: &ReportWindow,
    ) -> Vec<Message> {
        let path = format!("/channels/{source_id}/messages");
        // Nothing newer than the window end is needed.
        let mut before =
            snowflake_at(window.end_utc() + chrono::Duration::milliseconds(1)).to_string();
        let mut messages = Vec::new();
        loop {
            let query = [
                ("limit", MESSAGE_PAGE_SIZE.to_string()),
                ("before", before.clone()),
            ];
            let page: Vec<WireMessage> = match self.fetch_page(&path, &query, Forbidden::Skip).await {
                Ok(Some(page)) => page,
                Ok(None) => {
                    debug!(channel_id = source_id, "Channel not readable, skipping");
                    break;
                }
                Err(err) => {
                    warn!(channel_id = source_id, error = %err, "Message scan aborted");
                    break;
                }
            };
            let page_len = page.len();
            let Some(last_id) = page.last().map(|m| m.id.clone()) else {
                break;
            };
            let scan = scan_message_page(page, window);
            messages.extend(
                scan.kept
                    .into_iter()
                    .map(|m| m.into_message(root_channel_id, thread_id)),
            );
            if scan.reached_start || page_len < MESSAGE_PAGE_SIZE {
                break;
            }
            before = last_id;
        }
        messages
    }

    /// Every active thread of the guild.
    ///
    /// Discord returns the whole guild in one response, so callers list once
    /// per job and hand the result to [`DiscordClient::window_threads`] for
    /// each parent. An unreadable listing yields no threads.
    pub async fn active_threads(&self, guild_id: &str) -> Result<Vec<Channel>, DiscordError> {
        let path = format!("/guilds/{guild_id}/threads/active");
        let Some(list) = self
            .fetch_page::<WireThreadList>(&path, &[], Forbidden::Skip)
            .await?
        else {
            debug!(guild_id, "Active threads not readable, skipping");
            return Ok(Vec::new());
        };
        debug!(guild_id, count = list.threads.len(), "Fetched active threads");
        Ok(list.threads.into_iter().map(Channel::from).collect())
    }

    /// Threads under `parent` that may hold messages inside `window`.
    ///
    /// Combines the guild's `active` threads belonging to `parent` with its
    /// archived public and archived private threads; archived lists the bot
    /// cannot read are skipped.
    pub async fn window_threads(
        &self,
        parent: &Channel,
        active: &[Channel],
        window: &ReportWindow,
    ) -> Vec<Channel> {
        let created_after_end = |id: &str| {
            timestamp_of(id)
                .map(|created| created > window.end_utc())
                .unwrap_or(false)
        };

        let mut seen = HashSet::new();
        let mut threads: Vec<Channel> = active
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent.id.as_str()))
            .filter(|t| !created_after_end(&t.id))
            .filter(|t| seen.insert(t.id.clone()))
            .cloned()
            .collect();

        for visibility in ["public", "private"] {
            let path = format!("/channels/{}/threads/archived/{visibility}", parent.id);
            threads.extend(
                self.archived_threads(&path, window)
                    .await
                    .into_iter()
                    .filter(|thread| !created_after_end(&thread.id))
                    .filter(|thread| {
                        !thread
                            .archived_at()
                            .is_some_and(|archived| archived < window.start_utc())
                    })
                    .filter(|thread| seen.insert(thread.id.clone()))
                    .map(Channel::from),
            );
        }
        threads
    }

    async fn archived_threads(&self, path: &str, window: &ReportWindow) -> Vec<WireChannel> {
        let mut threads = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let mut query = vec![("limit", THREAD_PAGE_SIZE.to_string())];
            if let Some(cursor) = &before {
                query.push(("before", cursor.clone()));
            }
            let list: WireThreadList = match self.fetch_page(path, &query, Forbidden::Skip).await {
                Ok(Some(list)) => list,
                Ok(None) => break,
                Err(err) => {
                    warn!(path, error = %err, "Archived thread listing aborted");
                    break;
                }
            };
            // Newest archive first: once a thread was archived before the
            // window started, every later one was too.
            let oldest = list.threads.last().and_then(WireChannel::archive_timestamp);
            threads.extend(list.threads);
            match oldest {
                Some(archived) if list.has_more && archived >= window.start_utc() => {
                    before = Some(archived.to_rfc3339());
                }
                _ => break,
            }
        }
        threads
    }

    /// Audit-log entries of `action` created at or after `since`.
    pub async fn audit_entries(
        &self,
        guild_id: &str,
        action: AuditAction,
        since: DateTime<Utc>,
        termination: AuditLogTermination,
    ) -> Result<Vec<AuditLogEntry>, DiscordError> {
        let path = format!("/guilds/{guild_id}/audit-logs");
        let mut entries = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let mut query = vec![
                ("action_type", action.code().to_string()),
                ("limit", AUDIT_PAGE_SIZE.to_string()),
            ];
            if let Some(cursor) = &before {
                query.push(("before", cursor.clone()));
            }
            let Some(log) = self
                .fetch_page::<WireAuditLog>(&path, &query, Forbidden::Skip)
                .await?
            else {
                warn!(guild_id, ?action, "Audit log not readable, continuing without it");
                break;
            };
            let page_len = log.audit_log_entries.len();
            let Some(last_id) = log.audit_log_entries.last().map(|e| e.id.clone()) else {
                break;
            };
            let page: Vec<AuditLogEntry> = log
                .audit_log_entries
                .into_iter()
                .filter_map(WireAuditEntry::into_entry)
                .collect();
            let (kept, stop) = scan_audit_page(page, since, termination);
            entries.extend(kept);
            if stop || page_len < AUDIT_PAGE_SIZE {
                break;
            }
            before = Some(last_id);
        }
        debug!(guild_id, ?action, count = entries.len(), "Fetched audit-log entries");
        Ok(entries)
    }
}
