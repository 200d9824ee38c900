//! Report sink abstraction and row layout.
//!
//! Rows are keyed by the window label in the first column. An existing label
//! is overwritten in place; a new label is inserted directly under the header
//! so the newest report is always on top.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::metrics::MetricsSnapshot;

pub const SHEET_HEADER: [&str; 8] = [
    "Week",
    "Total Members",
    "New Members",
    "Active Users",
    "Messages Posted",
    "Reactions",
    "Projects Showcased",
    "Project Links",
];

/// First data row (1-based, below the header).
pub const FIRST_DATA_ROW: usize = 2;

/// The 8 cells written for one report.
pub fn snapshot_row(label: &str, snapshot: &MetricsSnapshot) -> Vec<String> {
    vec![
        label.to_string(),
        snapshot.total_members.to_string(),
        snapshot.new_members.to_string(),
        snapshot.active_users.to_string(),
        snapshot.messages_posted.to_string(),
        snapshot.total_reactions.to_string(),
        snapshot.projects_showcased.to_string(),
        snapshot.project_links.join("\n"),
    ]
}

pub fn header_row() -> Vec<String> {
    SHEET_HEADER.iter().map(|h| h.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UpsertOutcome {
    Updated { row: usize },
    Inserted { row: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPlan {
    /// The sheet is empty: write the header, then the row below it.
    WriteHeaderThenRow,
    /// Overwrite the 1-based sheet row holding the label.
    Overwrite { row: usize },
    InsertBelowHeader,
}

/// Decide how to write `label` given the sheet's first column (header included).
pub fn plan_upsert(first_column: &[String], label: &str) -> UpsertPlan {
    if first_column.is_empty() {
        return UpsertPlan::WriteHeaderThenRow;
    }
    let label = label.trim();
    match first_column
        .iter()
        .skip(1)
        .position(|cell| cell.trim() == label)
    {
        Some(index) => UpsertPlan::Overwrite {
            row: index + FIRST_DATA_ROW,
        },
        None => UpsertPlan::InsertBelowHeader,
    }
}

/// Destination for finished reports.
#[async_trait]
pub trait ReportSink: Send + Sync + 'static {
    async fn upsert(&self, label: &str, snapshot: &MetricsSnapshot)
        -> anyhow::Result<UpsertOutcome>;
}

/// In-process sheet with the same upsert semantics as the spreadsheet sink.
///
/// Used for dry runs, where rows only go to the log, and in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Current sheet contents, header first.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn upsert(
        &self,
        label: &str,
        snapshot: &MetricsSnapshot,
    ) -> anyhow::Result<UpsertOutcome> {
        let row = snapshot_row(label, snapshot);
        let mut rows = self.rows.lock().unwrap_or_else(|p| p.into_inner());
        let first_column: Vec<String> = rows
            .iter()
            .map(|r| r.first().cloned().unwrap_or_default())
            .collect();

        let outcome = match plan_upsert(&first_column, label) {
            UpsertPlan::WriteHeaderThenRow => {
                rows.push(header_row());
                rows.push(row.clone());
                UpsertOutcome::Inserted {
                    row: FIRST_DATA_ROW,
                }
            }
            UpsertPlan::Overwrite { row: sheet_row } => {
                rows[sheet_row - 1] = row.clone();
                UpsertOutcome::Updated { row: sheet_row }
            }
            UpsertPlan::InsertBelowHeader => {
                rows.insert(FIRST_DATA_ROW - 1, row.clone());
                UpsertOutcome::Inserted {
                    row: FIRST_DATA_ROW,
                }
            }
        };
        info!(label, ?outcome, row = ?row, "Report row written to memory sink");
        Ok(outcome)
    }
}
