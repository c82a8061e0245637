use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A timestamp as it appears in a stored document.
///
/// Documents written by different clients carry RFC 3339 strings, epoch
/// milliseconds or `{seconds, nanoseconds}` objects. Anything else is kept
/// verbatim in `Other` so a bad field never fails the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
    Document {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    Other(Value),
}

impl Timestamp {
    /// Resolves the stored value to an instant, or `None` when it cannot be parsed.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Millis(millis) => Utc.timestamp_millis_opt(*millis).single(),
            Timestamp::Text(raw) => parse_text(raw),
            Timestamp::Document {
                seconds,
                nanoseconds,
            } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
            Timestamp::Other(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp::Text(value.to_rfc3339())
    }
}

/// Parses an optional stored timestamp, treating absence and garbage alike.
pub fn resolve(value: Option<&Timestamp>) -> Option<DateTime<Utc>> {
    value.and_then(Timestamp::to_utc)
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Zone-less values are read as UTC.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
