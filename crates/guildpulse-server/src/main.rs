use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use guildpulse_core::{
    sink::{MemorySink, ReportSink},
    source::CommunitySource,
    window::ReportWindow,
};
use guildpulse_discord::DiscordSource;
use guildpulse_server::{config::Config, state::AppState};
use guildpulse_sheets::SheetsSink;

/// `guildpulse health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$GUILDPULSE_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("GUILDPULSE_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

fn build_sink(cfg: &Config) -> Result<Arc<dyn ReportSink>> {
    if cfg.dry_run {
        warn!("Dry run: report rows are logged and kept in memory only");
        return Ok(Arc::new(MemorySink::new()));
    }
    Ok(Arc::new(SheetsSink::from_config(cfg)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // A missing .env file is fine; the process environment still applies.
    dotenvy::dotenv().ok();

    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guildpulse=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let source: Arc<dyn CommunitySource> = Arc::new(DiscordSource::from_config(&cfg)?);
    let sink = build_sink(&cfg)?;
    let state = Arc::new(AppState::new(cfg.clone(), source, sink));

    // `guildpulse collect "<week range>"` runs one job in the foreground.
    if args.get(1).map(|s| s.as_str()) == Some("collect") {
        let Some(label) = args.get(2) else {
            bail!("usage: guildpulse collect \"Jan 1 2024 - Jan 7 2024\"");
        };
        let window = ReportWindow::parse(label, cfg.timezone)?;
        let report = state.collector.run(&window).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = guildpulse_server::app::build_app(Arc::clone(&state));

    info!(
        port = cfg.port,
        guild_id = %cfg.guild_id,
        timezone = %cfg.timezone,
        dry_run = cfg.dry_run,
        "GuildPulse listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
