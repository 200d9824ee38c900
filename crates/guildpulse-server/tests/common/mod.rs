#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use http_body_util::BodyExt;
use serde_json::Value;

use guildpulse_core::config::{AuditLogTermination, Config};
use guildpulse_core::links::LinkMatchMode;
use guildpulse_core::model::{
    AuditAction, AuditLogEntry, Channel, ChannelKind, GuildSummary, Member, Message, Reaction,
};
use guildpulse_core::sink::MemorySink;
use guildpulse_core::source::CommunitySource;
use guildpulse_core::window::ReportWindow;
use guildpulse_server::state::AppState;

pub const LINKS_CHANNEL: &str = "20";
pub const BROKEN_CHANNEL: &str = "40";

pub fn test_config() -> Config {
    Config {
        port: 0,
        discord_token: "test-token".to_string(),
        guild_id: "900".to_string(),
        links_channel_id: LINKS_CHANNEL.to_string(),
        spreadsheet_id: String::new(),
        sheet_name: "Sheet1".to_string(),
        service_account_json: String::new(),
        timezone: New_York,
        discord_api_base: "http://127.0.0.1:9".to_string(),
        sheets_api_base: "http://127.0.0.1:9".to_string(),
        excluded_link_fragment: "discord.com".to_string(),
        link_match: LinkMatchMode::Strict,
        include_threads: true,
        member_page_delay_ms: 0,
        max_rate_limit_retries: 8,
        audit_termination: AuditLogTermination::EmptyPage,
        subtract_absent_leaves: false,
        dry_run: true,
        cors_origins: vec![],
    }
}

pub fn ny(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    let year = if month >= 6 { 2023 } else { 2024 };
    New_York
        .with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("unambiguous")
        .with_timezone(&Utc)
}

fn member(id: &str, joined_at: DateTime<Utc>) -> Member {
    Member {
        user_id: id.to_string(),
        joined_at: Some(joined_at),
        is_bot: false,
    }
}

fn channel(id: &str, name: &str, kind: ChannelKind) -> Channel {
    Channel {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        parent_id: None,
    }
}

fn message(id: &str, channel_id: &str, author: &str, at: DateTime<Utc>, content: &str, reactions: u64) -> Message {
    Message {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        thread_id: None,
        author_id: author.to_string(),
        timestamp: at,
        content: content.to_string(),
        reactions: if reactions > 0 {
            vec![Reaction {
                emoji: "🔥".to_string(),
                count: reactions,
            }]
        } else {
            vec![]
        },
        deleted: false,
    }
}

fn audit(id: &str, action: AuditAction, at: DateTime<Utc>) -> AuditLogEntry {
    AuditLogEntry {
        id: id.to_string(),
        action,
        target_id: None,
        user_id: None,
        created_at: at,
        channel_id: None,
        count: None,
    }
}

/// In-memory guild for the "Jan 1 2024 - Jan 7 2024" week.
pub struct FakeSource {
    pub members_error: Option<String>,
    pub members: Vec<Member>,
    pub channels: Vec<Channel>,
    pub messages: HashMap<String, Vec<Message>>,
    pub audit: Vec<AuditLogEntry>,
    pub thread_listings: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        let mut messages = HashMap::new();
        messages.insert(
            "10".to_string(),
            vec![
                message("m1", "10", "alice", ny(1, 2, 12), "morning", 3),
                message("m2", "10", "bob", ny(1, 4, 12), "hi all", 0),
            ],
        );
        messages.insert(
            LINKS_CHANNEL.to_string(),
            vec![
                message(
                    "m3",
                    LINKS_CHANNEL,
                    "alice",
                    ny(1, 5, 12),
                    "built https://proj.dev see https://discord.com/channels/1/2",
                    1,
                ),
                message("m4", LINKS_CHANNEL, "bob", ny(1, 6, 12), "also https://proj.dev!", 0),
            ],
        );

        let mut deletion = audit("d1", AuditAction::MessageDelete, ny(1, 3, 12));
        deletion.count = Some(2);
        let mut update = audit("u1", AuditAction::MemberUpdate, ny(1, 2, 9));
        update.user_id = Some("carol".to_string());

        Self {
            members_error: None,
            members: vec![
                member("alice", ny(6, 1, 12)),
                member("bob", ny(1, 3, 8)),
                member("carol", ny(1, 10, 8)),
            ],
            channels: vec![
                channel("10", "general", ChannelKind::Text),
                channel(LINKS_CHANNEL, "showcase", ChannelKind::Text),
                channel("30", "lounge", ChannelKind::Voice),
                channel(BROKEN_CHANNEL, "private", ChannelKind::Text),
            ],
            messages,
            audit: vec![deletion, update],
            thread_listings: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn links_kind(mut self, kind: ChannelKind) -> Self {
        if let Some(links) = self.channels.iter_mut().find(|c| c.id == LINKS_CHANNEL) {
            links.kind = kind;
        }
        self
    }

    pub fn failing_members(mut self, error: &str) -> Self {
        self.members_error = Some(error.to_string());
        self
    }
}

#[async_trait]
impl CommunitySource for FakeSource {
    async fn guild_summary(&self) -> anyhow::Result<GuildSummary> {
        Ok(GuildSummary {
            id: "900".to_string(),
            name: "Builders".to_string(),
            approximate_member_count: 99,
        })
    }

    async fn members(&self) -> anyhow::Result<Vec<Member>> {
        match &self.members_error {
            Some(error) => Err(anyhow::anyhow!("{error}")),
            None => Ok(self.members.clone()),
        }
    }

    async fn channels(&self) -> anyhow::Result<Vec<Channel>> {
        Ok(self.channels.clone())
    }

    async fn active_threads(&self) -> anyhow::Result<Vec<Channel>> {
        self.thread_listings.fetch_add(1, Ordering::SeqCst);
        let mut thread = channel("11", "standup", ChannelKind::PublicThread);
        thread.parent_id = Some("10".to_string());
        Ok(vec![thread])
    }

    async fn window_messages(
        &self,
        channel: &Channel,
        active_threads: &[Channel],
        _window: &ReportWindow,
    ) -> anyhow::Result<Vec<Message>> {
        assert_eq!(active_threads.len(), 1, "active threads are shared by every channel");
        if channel.id == BROKEN_CHANNEL {
            anyhow::bail!("discord API responded with status 500");
        }
        assert!(
            channel.kind.is_messageable() || channel.id == LINKS_CHANNEL,
            "voice channels are never scanned"
        );
        Ok(self.messages.get(&channel.id).cloned().unwrap_or_default())
    }

    async fn audit_entries(
        &self,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AuditLogEntry>> {
        Ok(self
            .audit
            .iter()
            .filter(|e| e.action == action && e.created_at >= since)
            .cloned()
            .collect())
    }
}

pub fn test_state(source: FakeSource) -> (Arc<AppState>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let state = Arc::new(AppState::new(test_config(), Arc::new(source), sink.clone()));
    (state, sink)
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}
