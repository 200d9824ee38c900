//! One collection job: fetch everything a window needs, reconcile it into a
//! snapshot and upsert the report row.
//!
//! The membership, activity and audit-log branches run concurrently; channels
//! inside the activity branch are scanned one after another so the bot stays
//! well inside Discord's per-route limits.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

use guildpulse_core::{
    config::Config,
    links::LinkExtractor,
    metrics::MetricsSnapshot,
    model::{AuditAction, Message},
    reconcile::{build_snapshot, CollectedData, ReconcileOptions},
    sink::{ReportSink, UpsertOutcome},
    source::CommunitySource,
    window::ReportWindow,
};

/// Finished jobs are forgotten after this long.
const JOB_RETENTION_HOURS: i64 = 24;

/// Collection settings that do not depend on the upstream clients.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub links_channel_id: String,
    pub timezone: Tz,
    pub extractor: LinkExtractor,
    pub subtract_absent_leaves: bool,
}

impl CollectorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            links_channel_id: cfg.links_channel_id.clone(),
            timezone: cfg.timezone,
            extractor: LinkExtractor::new(cfg.link_match, &cfg.excluded_link_fragment),
            subtract_absent_leaves: cfg.subtract_absent_leaves,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub week_range: String,
    pub metrics: MetricsSnapshot,
    pub sheet: UpsertOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JobState {
    Running,
    Succeeded {
        metrics: MetricsSnapshot,
        sheet: UpsertOutcome,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: Uuid,
    pub week_range: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: JobState,
}

/// A submitted job; dropping it leaves the job running in the background.
pub struct JobHandle {
    pub id: Uuid,
    task: JoinHandle<anyhow::Result<CollectionReport>>,
}

impl JobHandle {
    pub async fn wait(self) -> anyhow::Result<CollectionReport> {
        self.task
            .await
            .map_err(|e| anyhow!("collection task aborted: {e}"))?
    }
}

#[derive(Debug, Default)]
struct WindowActivity {
    messages: Vec<Message>,
    link_messages: Vec<Message>,
}

pub struct Collector {
    source: Arc<dyn CommunitySource>,
    sink: Arc<dyn ReportSink>,
    settings: CollectorSettings,
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl Collector {
    pub fn new(
        source: Arc<dyn CommunitySource>,
        sink: Arc<dyn ReportSink>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            source,
            sink,
            settings,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.settings.timezone
    }

    /// In-window messages of every messageable channel, and separately those
    /// of the links channel.
    ///
    /// The guild's active threads are listed once and shared by every channel.
    /// A channel that fails is logged and contributes nothing.
    async fn window_activity(&self, window: &ReportWindow) -> anyhow::Result<WindowActivity> {
        let channels = self
            .source
            .channels()
            .await
            .context("listing guild channels")?;
        let active_threads = self.source.active_threads().await.unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "Active thread listing failed, continuing without it");
            Vec::new()
        });

        let mut activity = WindowActivity::default();
        for channel in &channels {
            let is_links = channel.id == self.settings.links_channel_id;
            if !channel.kind.is_messageable() && !is_links {
                continue;
            }
            match self
                .source
                .window_messages(channel, &active_threads, window)
                .await
            {
                Ok(found) => {
                    if is_links {
                        activity.link_messages.extend(found.iter().cloned());
                    }
                    if channel.kind.is_messageable() {
                        activity.messages.extend(found);
                    }
                }
                Err(err) => warn!(
                    channel_id = %channel.id,
                    channel = %channel.name,
                    error = %format!("{err:#}"),
                    "Skipping channel after fetch failure"
                ),
            }
        }
        Ok(activity)
    }

    /// Fetch and reconcile everything for `window`.
    pub async fn collect(&self, window: &ReportWindow) -> anyhow::Result<MetricsSnapshot> {
        let since = window.start_utc();

        let membership = async {
            let guild = self
                .source
                .guild_summary()
                .await
                .context("fetching guild summary")?;
            let members = self.source.members().await.context("listing guild members")?;
            anyhow::Ok((guild, members))
        };

        let audits = async {
            let (kicks, bans, member_updates, deletions) = tokio::try_join!(
                self.source.audit_entries(AuditAction::MemberKick, since),
                self.source.audit_entries(AuditAction::MemberBanAdd, since),
                self.source.audit_entries(AuditAction::MemberUpdate, since),
                self.source.audit_entries(AuditAction::MessageDelete, since),
            )
            .context("reading audit log")?;
            let mut leaves = kicks;
            leaves.extend(bans);
            anyhow::Ok((leaves, member_updates, deletions))
        };

        let ((guild, members), activity, (leaves, member_updates, deletions)) =
            tokio::try_join!(membership, self.window_activity(window), audits)?;

        info!(
            week_range = window.label(),
            guild = %guild.name,
            members = members.len(),
            messages = activity.messages.len(),
            link_messages = activity.link_messages.len(),
            leaves = leaves.len(),
            deletions = deletions.len(),
            "Collected window data"
        );

        let data = CollectedData {
            approximate_member_count: guild.approximate_member_count,
            members,
            messages: activity.messages,
            link_messages: activity.link_messages,
            leaves,
            member_updates,
            deletions,
        };
        let options = ReconcileOptions {
            extractor: &self.settings.extractor,
            subtract_absent_leaves: self.settings.subtract_absent_leaves,
        };
        Ok(build_snapshot(window, Utc::now(), &data, &options))
    }

    /// Collect `window` and write its report row.
    pub async fn run(&self, window: &ReportWindow) -> anyhow::Result<CollectionReport> {
        let metrics = self.collect(window).await?;
        let sheet = self
            .sink
            .upsert(window.label(), &metrics)
            .await
            .context("writing report row")?;
        Ok(CollectionReport {
            week_range: window.label().to_string(),
            metrics,
            sheet,
        })
    }

    /// Start a background job for `window`.
    pub async fn submit(self: &Arc<Self>, window: ReportWindow) -> JobHandle {
        let id = Uuid::new_v4();
        {
            let mut jobs = self.jobs.write().await;
            let cutoff = Utc::now() - Duration::hours(JOB_RETENTION_HOURS);
            jobs.retain(|_, job| job.finished_at.map_or(true, |at| at > cutoff));
            jobs.insert(
                id,
                JobRecord {
                    job_id: id,
                    week_range: window.label().to_string(),
                    started_at: Utc::now(),
                    finished_at: None,
                    state: JobState::Running,
                },
            );
        }
        info!(job_id = %id, week_range = window.label(), "Collection job started");

        let collector = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = collector.run(&window).await;
            let state = match &result {
                Ok(report) => {
                    info!(
                        job_id = %id,
                        week_range = %report.week_range,
                        metrics = ?report.metrics,
                        sheet = ?report.sheet,
                        "Collection job succeeded"
                    );
                    JobState::Succeeded {
                        metrics: report.metrics.clone(),
                        sheet: report.sheet,
                    }
                }
                Err(err) => {
                    error!(job_id = %id, week_range = window.label(), error = %format!("{err:#}"), "Collection job failed");
                    JobState::Failed {
                        error: format!("{err:#}"),
                    }
                }
            };
            if let Some(job) = collector.jobs.write().await.get_mut(&id) {
                job.finished_at = Some(Utc::now());
                job.state = state;
            }
            result
        });
        JobHandle { id, task }
    }

    pub async fn status(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }
}
