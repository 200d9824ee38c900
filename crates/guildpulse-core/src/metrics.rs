use serde::Serialize;

/// The metric values computed for one report window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_members: u64,
    pub new_members: u64,
    pub active_users: u64,
    pub messages_posted: u64,
    pub total_reactions: u64,
    pub projects_showcased: u64,
    pub project_links: Vec<String>,
}
