mod common;

use std::time::Duration;

use mockito::Matcher;
use serde_json::{json, Value};

use guildpulse_core::config::AuditLogTermination;
use guildpulse_core::model::{AuditAction, Channel, ChannelKind};
use guildpulse_core::source::CommunitySource;
use guildpulse_discord::{DiscordSource, RetryPolicy};

use common::{client, message, ny, snowflake, week, GUILD_ID};

fn member(id: u64) -> Value {
    json!({
        "user": { "id": id.to_string(), "bot": id % 100 == 0 },
        "joined_at": "2023-06-01T12:00:00.000000+00:00"
    })
}

/// An active thread as Discord lists it: never archived, so its
/// `archive_timestamp` is its creation time.
fn active_thread(id: &str, parent: &str, created: chrono::DateTime<chrono::Utc>) -> Value {
    json!({
        "id": id,
        "type": 11,
        "parent_id": parent,
        "thread_metadata": { "archived": false, "archive_timestamp": created.to_rfc3339() }
    })
}

fn forum(id: &str) -> Channel {
    Channel {
        id: id.to_string(),
        name: format!("forum-{id}"),
        kind: ChannelKind::Forum,
        parent_id: None,
    }
}

fn audit_entry(id: &str, action: u16, target: &str) -> Value {
    json!({ "id": id, "action_type": action, "target_id": target, "user_id": "mod-1" })
}

// ============================================================
// BDD: members are paged 1000 at a time by user id
// ============================================================
#[tokio::test]
async fn test_member_listing_follows_after_cursor_and_waits_between_pages() {
    let mut server = mockito::Server::new_async().await;
    let first_page: Vec<Value> = (1..=1000).map(member).collect();
    let first = server
        .mock("GET", "/guilds/900/members")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "1000".into()),
            Matcher::UrlEncoded("after".into(), "0".into()),
        ]))
        .with_status(200)
        .with_body(Value::Array(first_page).to_string())
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/guilds/900/members")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "1000".into()),
            Matcher::UrlEncoded("after".into(), "1000".into()),
        ]))
        .with_status(200)
        .with_body(json!([member(1001), member(1002)]).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, sleeper) = client(&server.url(), RetryPolicy::default());
    let members = client
        .list_members(GUILD_ID, Duration::from_millis(250))
        .await
        .expect("members");

    assert_eq!(members.len(), 1002);
    assert_eq!(members.iter().filter(|m| m.is_bot).count(), 10);
    assert_eq!(members.last().map(|m| m.user_id.as_str()), Some("1002"));
    assert_eq!(sleeper.waits(), vec![Duration::from_millis(250)]);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_member_listing_failure_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _denied = server
        .mock("GET", "/guilds/900/members")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body(r#"{"message":"Missing Access"}"#)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let err = client
        .list_members(GUILD_ID, Duration::ZERO)
        .await
        .expect_err("members are required");
    assert_eq!(err.status(), Some(403));
}

// ============================================================
// BDD: message scans stop at the first message older than the window
// ============================================================
#[tokio::test]
async fn test_message_scan_stops_once_window_start_is_passed() {
    let mut server = mockito::Server::new_async().await;
    let window = week();
    let newest = ny(2024, 1, 7, 20, 0);
    let mut page: Vec<Value> = (0..99)
        .map(|i| {
            let at = newest - chrono::Duration::minutes(i);
            message(&snowflake(at), "u1", at, "hello")
        })
        .collect();
    let stale = ny(2023, 12, 31, 23, 0);
    page.push(message(&snowflake(stale), "u2", stale, "old"));

    let scan = server
        .mock("GET", "/channels/10/messages")
        .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
        .with_status(200)
        .with_body(Value::Array(page).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let messages = client.window_messages("10", "10", None, &window).await;

    assert_eq!(messages.len(), 99);
    assert!(messages.iter().all(|m| m.channel_id == "10" && m.thread_id.is_none()));
    scan.assert_async().await;
}

#[tokio::test]
async fn test_message_scan_starts_just_after_window_end() {
    let mut server = mockito::Server::new_async().await;
    let window = week();
    let cursor = snowflake(window.end_utc() + chrono::Duration::milliseconds(1));
    let scan = server
        .mock("GET", "/channels/10/messages")
        .match_query(Matcher::UrlEncoded("before".into(), cursor))
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    assert!(client.window_messages("10", "10", None, &window).await.is_empty());
    scan.assert_async().await;
}

#[tokio::test]
async fn test_unreadable_channel_yields_no_messages() {
    let mut server = mockito::Server::new_async().await;
    let _denied = server
        .mock("GET", "/channels/10/messages")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    assert!(client.window_messages("10", "10", None, &week()).await.is_empty());
}

// ============================================================
// BDD: exhausted rate limits get a page-level retry
// ============================================================
#[tokio::test]
async fn test_page_is_retried_after_client_gives_up_on_rate_limit() {
    let mut server = mockito::Server::new_async().await;
    let _limited = server
        .mock("GET", "/guilds/900/channels")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(1)
        .create_async()
        .await;
    let _ok = server
        .mock("GET", "/guilds/900/channels")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"id":"10","type":0,"name":"general"},{"id":"11","type":15,"name":"showcase"}]"#)
        .expect(1)
        .create_async()
        .await;

    let (client, sleeper) = client(&server.url(), RetryPolicy::with_max_retries(0));
    let channels = client.list_channels(GUILD_ID).await.expect("channels");

    assert_eq!(channels.len(), 2);
    assert_eq!(channels[1].kind, ChannelKind::Forum);
    assert_eq!(sleeper.waits(), vec![Duration::from_secs(1)]);
}

// ============================================================
// BDD: audit-log paging termination rules
// ============================================================
async fn audit_fixture(server: &mut mockito::ServerGuard, expect_second_page: usize) -> Vec<mockito::Mock> {
    let since = ny(2024, 1, 1, 0, 0);
    // 40 fresh entries followed by 60 older ones, newest first.
    let mut page: Vec<Value> = (0..40)
        .map(|i| {
            let at = ny(2024, 1, 6, 12, 0) - chrono::Duration::minutes(i);
            audit_entry(&snowflake(at), 20, &format!("fresh-{i}"))
        })
        .collect();
    page.extend((0..60).map(|i| {
        let at = since - chrono::Duration::hours(i + 1);
        audit_entry(&snowflake(at), 20, &format!("stale-{i}"))
    }));
    let last_id = page
        .last()
        .and_then(|e| e["id"].as_str())
        .map(str::to_string)
        .expect("last id");

    let first = server
        .mock("GET", "/guilds/900/audit-logs")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("action_type".into(), "20".into()),
            Matcher::UrlEncoded("limit".into(), "100".into()),
        ]))
        .with_status(200)
        .with_body(json!({ "audit_log_entries": page }).to_string())
        .expect(1)
        .create_async()
        .await;
    let older = ny(2023, 11, 1, 0, 0);
    let second = server
        .mock("GET", "/guilds/900/audit-logs")
        .match_query(Matcher::UrlEncoded("before".into(), last_id))
        .with_status(200)
        .with_body(
            json!({ "audit_log_entries": [audit_entry(&snowflake(older), 20, "ancient")] })
                .to_string(),
        )
        .expect(expect_second_page)
        .create_async()
        .await;
    vec![first, second]
}

#[tokio::test]
async fn test_audit_scan_with_empty_page_termination_reads_past_partial_page() {
    let mut server = mockito::Server::new_async().await;
    let mocks = audit_fixture(&mut server, 1).await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let entries = client
        .audit_entries(
            GUILD_ID,
            AuditAction::MemberKick,
            ny(2024, 1, 1, 0, 0),
            AuditLogTermination::EmptyPage,
        )
        .await
        .expect("entries");

    assert_eq!(entries.len(), 40);
    assert!(entries.iter().all(|e| e.action == AuditAction::MemberKick));
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_audit_scan_with_partial_page_termination_stops_early() {
    let mut server = mockito::Server::new_async().await;
    let mocks = audit_fixture(&mut server, 0).await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let entries = client
        .audit_entries(
            GUILD_ID,
            AuditAction::MemberKick,
            ny(2024, 1, 1, 0, 0),
            AuditLogTermination::PartialPage,
        )
        .await
        .expect("entries");

    assert_eq!(entries.len(), 40);
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_unreadable_audit_log_is_empty() {
    let mut server = mockito::Server::new_async().await;
    let _denied = server
        .mock("GET", "/guilds/900/audit-logs")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let entries = client
        .audit_entries(
            GUILD_ID,
            AuditAction::MessageDelete,
            ny(2024, 1, 1, 0, 0),
            AuditLogTermination::EmptyPage,
        )
        .await
        .expect("skip is not an error");
    assert!(entries.is_empty());
}

// ============================================================
// BDD: forum posts are read from their threads
// ============================================================
#[tokio::test]
async fn test_forum_messages_come_from_window_threads() {
    let mut server = mockito::Server::new_async().await;
    let live_thread = snowflake(ny(2024, 1, 2, 9, 0));
    let archived_thread = snowflake(ny(2024, 1, 3, 9, 0));
    let old_thread = snowflake(ny(2023, 11, 1, 9, 0));
    let future_thread = snowflake(ny(2024, 1, 9, 9, 0));

    let active = server
        .mock("GET", "/guilds/900/threads/active")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "threads": [
                    active_thread(&live_thread, "500", ny(2024, 1, 2, 9, 0)),
                    active_thread(&future_thread, "500", ny(2024, 1, 9, 9, 0)),
                    active_thread("42", "777", ny(2024, 1, 2, 9, 0))
                ],
                "members": []
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let _public = server
        .mock("GET", "/channels/500/threads/archived/public")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;
    let _private = server
        .mock("GET", "/channels/500/threads/archived/private")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "threads": [
                    {
                        "id": archived_thread, "type": 12, "parent_id": "500",
                        "thread_metadata": { "archived": true, "archive_timestamp": ny(2024, 1, 5, 0, 0).to_rfc3339() }
                    },
                    {
                        "id": old_thread, "type": 12, "parent_id": "500",
                        "thread_metadata": { "archived": true, "archive_timestamp": ny(2023, 12, 1, 0, 0).to_rfc3339() }
                    }
                ],
                "has_more": false
            })
            .to_string(),
        )
        .create_async()
        .await;

    let forum_own = server
        .mock("GET", "/channels/500/messages")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let at = ny(2024, 1, 4, 10, 0);
    let live = server
        .mock("GET", format!("/channels/{live_thread}/messages").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!([message("m1", "u1", at, "see https://proj.dev")]).to_string())
        .expect(1)
        .create_async()
        .await;
    let archived = server
        .mock("GET", format!("/channels/{archived_thread}/messages").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!([message("m2", "u2", at, "nice")]).to_string())
        .expect(1)
        .create_async()
        .await;
    let skipped_old = server
        .mock("GET", format!("/channels/{old_thread}/messages").as_str())
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let skipped_future = server
        .mock("GET", format!("/channels/{future_thread}/messages").as_str())
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let source = DiscordSource::new(client, GUILD_ID);
    let forum = Channel {
        id: "500".to_string(),
        name: "showcase".to_string(),
        kind: ChannelKind::Forum,
        parent_id: None,
    };
    let threads = source.active_threads().await.expect("active threads");
    let mut messages = source
        .window_messages(&forum, &threads, &week())
        .await
        .expect("messages");
    messages.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.channel_id == "500"));
    assert_eq!(messages[0].thread_id.as_deref(), Some(live_thread.as_str()));
    assert_eq!(messages[1].thread_id.as_deref(), Some(archived_thread.as_str()));
    active.assert_async().await;
    forum_own.assert_async().await;
    live.assert_async().await;
    archived.assert_async().await;
    skipped_old.assert_async().await;
    skipped_future.assert_async().await;
}

#[tokio::test]
async fn test_threads_are_ignored_when_disabled() {
    let mut server = mockito::Server::new_async().await;
    let active = server
        .mock("GET", "/guilds/900/threads/active")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let own = server
        .mock("GET", "/channels/10/messages")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let source = DiscordSource::new(client, GUILD_ID).with_threads(false);
    let general = Channel {
        id: "10".to_string(),
        name: "general".to_string(),
        kind: ChannelKind::Text,
        parent_id: None,
    };
    let threads = source.active_threads().await.expect("active threads");
    assert!(threads.is_empty());
    let messages = source
        .window_messages(&general, &threads, &week())
        .await
        .expect("messages");
    assert!(messages.is_empty());
    active.assert_async().await;
    own.assert_async().await;
}

#[tokio::test]
async fn test_long_running_active_thread_is_scanned() {
    let mut server = mockito::Server::new_async().await;
    let old_active = snowflake(ny(2023, 11, 1, 9, 0));

    let active = server
        .mock("GET", "/guilds/900/threads/active")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "threads": [active_thread(&old_active, "500", ny(2023, 11, 1, 9, 0))],
                "members": []
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let _archived = server
        .mock(
            "GET",
            Matcher::Regex(r"^/channels/(500|600)/threads/archived/(public|private)$".to_string()),
        )
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;
    let thread_messages = server
        .mock("GET", format!("/channels/{old_active}/messages").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!([message("m1", "u1", ny(2024, 1, 4, 10, 0), "still going")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let source = DiscordSource::new(client, GUILD_ID);
    let threads = source.active_threads().await.expect("active threads");

    let from_first = source
        .window_messages(&forum("500"), &threads, &week())
        .await
        .expect("messages");
    let from_second = source
        .window_messages(&forum("600"), &threads, &week())
        .await
        .expect("messages");

    assert_eq!(from_first.len(), 1);
    assert_eq!(from_first[0].thread_id.as_deref(), Some(old_active.as_str()));
    assert!(from_second.is_empty());
    // One guild-wide listing serves every forum.
    active.assert_async().await;
    thread_messages.assert_async().await;
}

#[tokio::test]
async fn test_announcement_channel_reads_its_own_messages() {
    let mut server = mockito::Server::new_async().await;
    let _archived = server
        .mock(
            "GET",
            Matcher::Regex(r"^/channels/70/threads/archived/(public|private)$".to_string()),
        )
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;
    let own = server
        .mock("GET", "/channels/70/messages")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!([message("m1", "u1", ny(2024, 1, 3, 10, 0), "https://proj.dev")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, _) = client(&server.url(), RetryPolicy::default());
    let source = DiscordSource::new(client, GUILD_ID);
    let news = Channel {
        id: "70".to_string(),
        name: "news".to_string(),
        kind: ChannelKind::Announcement,
        parent_id: None,
    };
    let messages = source
        .window_messages(&news, &[], &week())
        .await
        .expect("messages");

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].channel_id, "70");
    own.assert_async().await;
}
