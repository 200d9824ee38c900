#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde_json::{json, Value};

use guildpulse_core::snowflake::snowflake_at;
use guildpulse_core::window::ReportWindow;
use guildpulse_discord::{DiscordClient, RetryPolicy, Sleeper};

pub const TOKEN: &str = "test-token";
pub const GUILD_ID: &str = "900";

/// Sleeper that records every requested wait instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().expect("sleeper lock").clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().expect("sleeper lock").push(duration);
    }
}

pub fn client(base_url: &str, retry: RetryPolicy) -> (DiscordClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = DiscordClient::new(base_url, TOKEN, retry)
        .expect("build client")
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

pub fn week() -> ReportWindow {
    ReportWindow::parse("Jan 1 2024 - Jan 7 2024", New_York).expect("window")
}

/// New York wall-clock time as UTC.
pub fn ny(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    New_York
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("unambiguous")
        .with_timezone(&Utc)
}

pub fn snowflake(at: DateTime<Utc>) -> String {
    snowflake_at(at).to_string()
}

pub fn message(id: &str, author: &str, at: DateTime<Utc>, content: &str) -> Value {
    json!({
        "id": id,
        "author": { "id": author },
        "timestamp": at.to_rfc3339(),
        "content": content,
    })
}
