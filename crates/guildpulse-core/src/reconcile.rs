//! Window reconciliation: turns fetched guild data into a [`MetricsSnapshot`].
//!
//! Historical member totals start from the live member list and discount
//! members removed (kicked or banned) on or before the window end. Members who
//! left voluntarily after the window end are absent from the live list and are
//! not recoverable, so totals for past windows are a lower bound; audit-log
//! retention bounds how far back removals are known. Totals for windows that
//! have not ended yet use the guild's approximate member count instead.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{
    links::LinkExtractor,
    metrics::MetricsSnapshot,
    model::{AuditAction, AuditLogEntry, Member, Message},
    window::ReportWindow,
};

/// Everything fetched for one window.
#[derive(Debug, Clone, Default)]
pub struct CollectedData {
    pub approximate_member_count: u64,
    pub members: Vec<Member>,
    /// In-window messages from messageable channels and their threads.
    pub messages: Vec<Message>,
    /// In-window messages of the links channel and its threads, whatever the
    /// channel kind. Only project links are read from these.
    pub link_messages: Vec<Message>,
    /// Kick and ban entries.
    pub leaves: Vec<AuditLogEntry>,
    pub member_updates: Vec<AuditLogEntry>,
    pub deletions: Vec<AuditLogEntry>,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions<'a> {
    pub extractor: &'a LinkExtractor,
    pub subtract_absent_leaves: bool,
}

fn leaves_by_member(leaves: &[AuditLogEntry]) -> HashMap<&str, Vec<DateTime<Utc>>> {
    let mut by_member: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();
    for entry in leaves.iter().filter(|e| e.action.is_leave()) {
        if let Some(target) = entry.target_id.as_deref() {
            by_member.entry(target).or_default().push(entry.created_at);
        }
    }
    by_member
}

/// Guild size at the end of `window`.
///
/// A member counts when they joined on or before the end and were not removed
/// between that join and the end. Members with an unknown join time count.
pub fn total_members(
    window: &ReportWindow,
    now: DateTime<Utc>,
    approximate_member_count: u64,
    members: &[Member],
    leaves: &[AuditLogEntry],
) -> u64 {
    if window.is_in_progress(now) {
        return approximate_member_count;
    }
    let end = window.end_utc();
    let left = leaves_by_member(leaves);
    members
        .iter()
        .filter(|member| {
            let Some(joined) = member.joined_at else {
                return true;
            };
            if joined > end {
                return false;
            }
            !left
                .get(member.user_id.as_str())
                .is_some_and(|times| times.iter().any(|t| *t >= joined && *t <= end))
        })
        .count() as u64
}

/// Members whose join time falls inside `window`.
///
/// With `subtract_absent_leaves`, in-window removals of users missing from the
/// live listing are subtracted (saturating at zero).
pub fn new_members(
    window: &ReportWindow,
    members: &[Member],
    leaves: &[AuditLogEntry],
    subtract_absent_leaves: bool,
) -> u64 {
    let joined = members
        .iter()
        .filter(|m| m.joined_at.is_some_and(|t| window.contains(t)))
        .count() as u64;
    if !subtract_absent_leaves {
        return joined;
    }

    let present: HashSet<&str> = members.iter().map(|m| m.user_id.as_str()).collect();
    let absent_leaves: HashSet<&str> = leaves
        .iter()
        .filter(|e| e.action.is_leave() && window.contains(e.created_at))
        .filter_map(|e| e.target_id.as_deref())
        .filter(|id| !present.contains(id))
        .collect();
    joined.saturating_sub(absent_leaves.len() as u64)
}

/// Largest number of messages one delete entry can stand for (a bulk delete).
pub const MAX_DELETES_PER_ENTRY: u64 = 100;

/// Deleted-message overlays: one `deleted` message per message an audit entry
/// stands for, timestamped at the deletion.
pub fn deletion_overlays(entries: &[AuditLogEntry]) -> Vec<Message> {
    entries
        .iter()
        .filter(|e| e.action == AuditAction::MessageDelete)
        .flat_map(|entry| {
            let count = entry.count.unwrap_or(1).clamp(1, MAX_DELETES_PER_ENTRY);
            (0..count).map(move |i| Message {
                id: format!("{}:{i}", entry.id),
                channel_id: entry.channel_id.clone().unwrap_or_default(),
                thread_id: None,
                author_id: entry.target_id.clone().unwrap_or_default(),
                timestamp: entry.created_at,
                content: String::new(),
                reactions: Vec::new(),
                deleted: true,
            })
        })
        .collect()
}

fn live_in_window<'a>(
    window: &'a ReportWindow,
    messages: &'a [Message],
) -> impl Iterator<Item = &'a Message> + 'a {
    messages
        .iter()
        .filter(move |m| !m.deleted && window.contains(m.timestamp))
}

/// Distinct message authors plus members who updated their profile in-window.
pub fn active_users(
    window: &ReportWindow,
    messages: &[Message],
    member_updates: &[AuditLogEntry],
) -> u64 {
    let mut users: HashSet<&str> = live_in_window(window, messages)
        .map(|m| m.author_id.as_str())
        .collect();
    users.extend(
        member_updates
            .iter()
            .filter(|e| e.action == AuditAction::MemberUpdate && window.contains(e.created_at))
            .filter_map(|e| e.user_id.as_deref()),
    );
    users.len() as u64
}

/// In-window messages, deleted overlays included.
pub fn messages_posted(window: &ReportWindow, messages: &[Message]) -> u64 {
    messages
        .iter()
        .filter(|m| window.contains(m.timestamp))
        .count() as u64
}

pub fn total_reactions(window: &ReportWindow, messages: &[Message]) -> u64 {
    live_in_window(window, messages)
        .map(Message::reaction_total)
        .sum()
}

/// Unique links shared in the links channel (and its threads), oldest first.
pub fn project_links(
    window: &ReportWindow,
    link_messages: &[Message],
    extractor: &LinkExtractor,
) -> Vec<String> {
    let mut shared: Vec<&Message> = live_in_window(window, link_messages).collect();
    shared.sort_by_key(|m| m.timestamp);
    extractor.unique_links(shared.into_iter().map(|m| m.content.as_str()))
}

pub fn build_snapshot(
    window: &ReportWindow,
    now: DateTime<Utc>,
    data: &CollectedData,
    options: &ReconcileOptions<'_>,
) -> MetricsSnapshot {
    let mut messages = data.messages.clone();
    messages.extend(deletion_overlays(&data.deletions));

    let project_links = project_links(window, &data.link_messages, options.extractor);

    MetricsSnapshot {
        total_members: total_members(
            window,
            now,
            data.approximate_member_count,
            &data.members,
            &data.leaves,
        ),
        new_members: new_members(
            window,
            &data.members,
            &data.leaves,
            options.subtract_absent_leaves,
        ),
        active_users: active_users(window, &messages, &data.member_updates),
        messages_posted: messages_posted(window, &messages),
        total_reactions: total_reactions(window, &messages),
        projects_showcased: project_links.len() as u64,
        project_links,
    }
}
