use std::sync::Arc;

use guildpulse_core::{sink::ReportSink, source::CommunitySource};

use crate::{
    collector::{Collector, CollectorSettings},
    config::Config,
};

/// Shared application state, passed to every handler via `Arc`.
pub struct AppState {
    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Runs collection jobs and keeps their status for polling.
    pub collector: Arc<Collector>,
}

impl AppState {
    pub fn new(
        config: Config,
        source: Arc<dyn CommunitySource>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let settings = CollectorSettings::from_config(&config);
        Self {
            config: Arc::new(config),
            collector: Arc::new(Collector::new(source, sink, settings)),
        }
    }
}
