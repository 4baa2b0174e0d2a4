use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::store::StoreError;

/// A single learning record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Calendar day (YYYY-MM-DD) or full ISO timestamp, stored as given
    pub date: String,

    /// What was studied
    pub content: String,

    /// Duration in minutes, fractions allowed
    #[serde(deserialize_with = "deserialize_minutes")]
    pub time: f64,

    /// Optional free-form note, empty when absent
    #[serde(default)]
    pub note: String,
}

impl Record {
    pub fn new(date: String, content: String, time: f64, note: String) -> Self {
        Self {
            date,
            content,
            time,
            note,
        }
    }

    /// Calendar day of this record in the local time zone
    pub fn day(&self) -> Option<NaiveDate> {
        calendar_day(&self.date, &Local)
    }

    /// Line shown in a single day's list: `Reading (30 min) - chapter 2`
    pub fn day_line(&self) -> String {
        if self.note.is_empty() {
            format!("{} ({} min)", self.content, self.time)
        } else {
            format!("{} ({} min) - {}", self.content, self.time, self.note)
        }
    }

    /// Line shown in the full record list, prefixed with the calendar day
    pub fn list_line(&self) -> String {
        let day = self
            .day()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| self.date.clone());
        format!("{}: {}", day, self.day_line())
    }
}

/// Older blobs carry `time` as a numeric string
fn deserialize_minutes<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Minutes {
        Number(f64),
        Text(String),
    }

    let minutes = match Minutes::deserialize(deserializer)? {
        Minutes::Number(n) => Some(n),
        Minutes::Text(s) => s.trim().parse::<f64>().ok(),
    };
    minutes
        .filter(|m| m.is_finite())
        .ok_or_else(|| serde::de::Error::custom("invalid duration"))
}

/// Raw entry form fields as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordForm {
    pub content: String,
    pub time: String,
    pub note: String,
}

impl RecordForm {
    pub fn new(content: &str, time: &str, note: &str) -> Self {
        Self {
            content: content.to_string(),
            time: time.to_string(),
            note: note.to_string(),
        }
    }

    /// Validate the fields and build a record for `date`.
    ///
    /// Content is trimmed and must not be empty. Time must be a finite number
    /// of minutes above zero. The note and date are kept as given.
    pub fn into_record(self, date: String) -> Result<Record, StoreError> {
        let content = validate_content(&self.content)?;
        let time = parse_duration(&self.time)?;
        Ok(Record::new(date, content, time, self.note))
    }
}

pub fn validate_content(raw: &str) -> Result<String, StoreError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(StoreError::EmptyContent);
    }
    Ok(content.to_string())
}

pub fn parse_duration(raw: &str) -> Result<f64, StoreError> {
    match raw.trim().parse::<f64>() {
        Ok(minutes) if minutes.is_finite() && minutes > 0.0 => Ok(minutes),
        _ => Err(StoreError::InvalidDuration(raw.to_string())),
    }
}

/// Timestamp used by quick entries, e.g. `2024-03-15T10:00:00.000Z`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Reduce a stored date string to its calendar day in `tz`.
///
/// Timestamps with an offset are converted into `tz` first. Date-only values
/// and naive timestamps are already local and are taken as-is.
pub fn calendar_day<Tz: TimeZone>(value: &str, tz: &Tz) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(tz).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    None
}
