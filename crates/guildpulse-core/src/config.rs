use std::time::Duration;

use chrono_tz::Tz;

use crate::links::LinkMatchMode;

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub discord_token: String,
    pub guild_id: String,
    pub links_channel_id: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    /// Service-account key JSON, inline or as a path to the key file.
    pub service_account_json: String,
    pub timezone: Tz,
    pub discord_api_base: String,
    pub sheets_api_base: String,
    pub excluded_link_fragment: String,
    pub link_match: LinkMatchMode,
    pub include_threads: bool,
    pub member_page_delay_ms: u64,
    pub max_rate_limit_retries: u32,
    pub audit_termination: AuditLogTermination,
    pub subtract_absent_leaves: bool,
    /// Write rows to the in-memory sink and the log instead of Google Sheets.
    pub dry_run: bool,
    pub cors_origins: Vec<String>,
}

/// When an audit-log scan stops paging backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditLogTermination {
    /// Stop once a whole page yields no entries inside the window.
    #[default]
    EmptyPage,
    /// Stop as soon as any entry on a page falls before the window.
    PartialPage,
}

impl AuditLogTermination {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "empty-page" | "empty_page" => Ok(Self::EmptyPage),
            "partial-page" | "partial_page" => Ok(Self::PartialPage),
            other => Err(format!(
                "audit termination must be empty-page or partial-page, got {other:?}"
            )),
        }
    }
}

fn required(name: &str) -> Result<String, String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(format!("{name} is required")),
    }
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            let trimmed = v.trim();
            trimmed.eq_ignore_ascii_case("1")
                || trimmed.eq_ignore_ascii_case("true")
                || trimmed.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let dry_run = flag("GUILDPULSE_DRY_RUN", false);
        // Sheets credentials may be absent only when nothing is written to Sheets.
        let sheets_var = |name: &str| {
            if dry_run {
                Ok(optional(name, ""))
            } else {
                required(name)
            }
        };

        let timezone_raw = optional("GUILDPULSE_TIMEZONE", "America/New_York");
        let timezone: Tz = timezone_raw
            .parse()
            .map_err(|e| format!("invalid GUILDPULSE_TIMEZONE {timezone_raw:?}: {e}"))?;

        Ok(Self {
            port: optional("GUILDPULSE_PORT", "3000")
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            discord_token: required("DISCORD_BOT_TOKEN")?,
            guild_id: required("DISCORD_GUILD_ID")?,
            links_channel_id: required("DISCORD_LINKS_CHANNEL_ID")?,
            spreadsheet_id: sheets_var("GOOGLE_SPREADSHEET_ID")?,
            sheet_name: optional("GUILDPULSE_SHEET_NAME", "Sheet1"),
            service_account_json: sheets_var("GOOGLE_SERVICE_ACCOUNT_JSON")?,
            timezone,
            discord_api_base: optional("DISCORD_API_BASE", DEFAULT_DISCORD_API_BASE),
            sheets_api_base: optional("GOOGLE_SHEETS_API_BASE", DEFAULT_SHEETS_API_BASE),
            excluded_link_fragment: std::env::var("GUILDPULSE_EXCLUDED_LINK_FRAGMENT")
                .unwrap_or_else(|_| "discord.com".to_string()),
            link_match: LinkMatchMode::parse(&optional("GUILDPULSE_LINK_MATCH", "strict"))?,
            include_threads: flag("GUILDPULSE_INCLUDE_THREADS", true),
            member_page_delay_ms: optional("GUILDPULSE_MEMBER_PAGE_DELAY_MS", "1000")
                .parse()
                .unwrap_or(1000),
            max_rate_limit_retries: optional("GUILDPULSE_MAX_RATE_LIMIT_RETRIES", "8")
                .parse()
                .unwrap_or(8),
            audit_termination: AuditLogTermination::parse(&optional(
                "GUILDPULSE_AUDIT_TERMINATION",
                "empty-page",
            ))?,
            subtract_absent_leaves: flag("GUILDPULSE_SUBTRACT_ABSENT_LEAVES", false),
            dry_run,
            cors_origins: std::env::var("GUILDPULSE_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn member_page_delay(&self) -> Duration {
        Duration::from_millis(self.member_page_delay_ms)
    }
}
