//! Report windows parsed from week-range labels such as `"Jan 1 2024 - Jan 7 2024"`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;

/// Where a timestamp falls relative to a [`ReportWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    Before,
    Within,
    After,
}

/// An inclusive `[start, end]` range in the report timezone.
///
/// `start` is local midnight of the first date and `end` is the last
/// millisecond of the second date, so both boundaries belong to the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWindow {
    label: String,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
}

fn invalid(label: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidWindow {
        label: label.to_string(),
        reason: reason.into(),
    }
}

fn parse_date(label: &str, raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw.trim(), "%b %d %Y")
        .map_err(|e| invalid(label, format!("cannot parse date {:?}: {e}", raw.trim())))
}

impl ReportWindow {
    /// Parse `"<Mon> <D> <YYYY> - <Mon> <D> <YYYY>"` in timezone `tz`.
    pub fn parse(label: &str, tz: Tz) -> Result<Self, CoreError> {
        let trimmed = label.trim();
        let (first, second) = trimmed.split_once('-').ok_or_else(|| {
            invalid(label, "expected \"<Mon> <D> <YYYY> - <Mon> <D> <YYYY>\"")
        })?;
        let start_date = parse_date(label, first)?;
        let end_date = parse_date(label, second)?;
        if end_date < start_date {
            return Err(invalid(label, "end date is before start date"));
        }

        let start = tz
            .from_local_datetime(&start_date.and_time(NaiveTime::MIN))
            .earliest()
            .ok_or_else(|| invalid(label, "start of day does not exist in timezone"))?;
        let end = tz
            .from_local_datetime(&end_of_day(end_date))
            .latest()
            .ok_or_else(|| invalid(label, "end of day does not exist in timezone"))?;

        Ok(Self {
            label: trimmed.to_string(),
            start,
            end,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }

    pub fn position(&self, at: DateTime<Utc>) -> WindowPosition {
        if at < self.start_utc() {
            WindowPosition::Before
        } else if at > self.end_utc() {
            WindowPosition::After
        } else {
            WindowPosition::Within
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.position(at) == WindowPosition::Within
    }

    /// True while the window's end has not been reached yet.
    pub fn is_in_progress(&self, now: DateTime<Utc>) -> bool {
        self.end_utc() > now
    }
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    // 23:59:59.999 always exists.
    date.and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN))
}
