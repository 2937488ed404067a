use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Timestamp as it arrives from a document store.
///
/// Stores hand us native datetimes, epoch wrappers (`{"seconds": .., "nanoseconds": ..}`)
/// or plain strings. The shape is resolved once, in [`RawTimestamp::normalize`], and
/// nothing downstream of ingestion looks at it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Native(DateTime<Utc>),
    Epoch {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    Text(String),
}

impl RawTimestamp {
    pub fn epoch_now() -> Self {
        let now = Utc::now();
        RawTimestamp::Epoch {
            seconds: now.timestamp(),
            nanoseconds: now.timestamp_subsec_nanos(),
        }
    }

    /// Canonical form, `None` when the value cannot be read as a point in time.
    pub fn normalize(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Native(dt) => Some(*dt),
            RawTimestamp::Epoch {
                seconds,
                nanoseconds,
            } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
            RawTimestamp::Text(text) => parse_text(text.trim()),
        }
    }
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `HH:mm`
    Time,
    /// `dd/MM/yyyy`
    Date,
    /// `HH:mm dd/MM/yyyy`
    DateTime,
}

impl TimestampFormat {
    fn pattern(self) -> &'static str {
        match self {
            TimestampFormat::Time => "%H:%M",
            TimestampFormat::Date => "%d/%m/%Y",
            TimestampFormat::DateTime => "%H:%M %d/%m/%Y",
        }
    }
}

/// Display string for a normalized timestamp; empty when absent.
pub fn format_timestamp<Tz>(value: Option<&DateTime<Utc>>, tz: &Tz, format: TimestampFormat) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match value {
        Some(dt) => dt.with_timezone(tz).format(format.pattern()).to_string(),
        None => String::new(),
    }
}
