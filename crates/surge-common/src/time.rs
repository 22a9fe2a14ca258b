//! Time handling for model-run data.
//!
//! Covers the three encodings the pipeline meets: ISO 8601 request
//! parameters, compact cycle stamps embedded in storage URLs
//! (`%Y%m%d%H`), and CF-style offset encodings carried by remote
//! variables ("seconds since <epoch>").

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Parse an ISO 8601 timestamp, tolerating the variants callers send.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    // Full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Without timezone (assume UTC), T or space separated
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    // Date only
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// Parse a compact model-cycle stamp (`2021052318` = 2021-05-23 18Z).
///
/// Storage URLs embed these; a path word that fails this parse is a
/// hurricane advisory number, not a cycle.
pub fn parse_cycle(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y%m%d%H")
        .ok()
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Format a cycle timestamp back into its compact URL form.
pub fn format_cycle(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H").to_string()
}

/// A requested time window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting contradictory bounds.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeParseError> {
        if end < start {
            return Err(TimeParseError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window ending at `end` and reaching back `days` whole days.
    pub fn lookback(end: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: end - Duration::days(days.abs()),
            end,
        }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }
}

/// The units a CF offset axis can count in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

/// A CF-style time encoding: `<unit> since <base datetime>`.
///
/// Remote time axes carry their values as offsets under one of these;
/// the canonical form used throughout the response path is seconds
/// since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeEncoding {
    pub base: DateTime<Utc>,
    pub unit: TimeUnit,
}

impl TimeEncoding {
    /// The canonical encoding: seconds since 1970-01-01T00:00:00Z.
    pub fn canonical() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
            unit: TimeUnit::Seconds,
        }
    }

    /// The canonical unit string, as written on normalized slices.
    pub fn canonical_unit_string() -> &'static str {
        "seconds since 1970-01-01 00:00:00"
    }

    /// Parse a unit attribute like `"seconds since 2024-09-01 00:00:00"`.
    pub fn parse(unit: &str) -> Result<Self, TimeParseError> {
        let mut parts = unit.splitn(2, " since ");
        let unit_word = parts
            .next()
            .ok_or_else(|| TimeParseError::InvalidEncoding(unit.to_string()))?
            .trim()
            .to_ascii_lowercase();
        let base_str = parts
            .next()
            .ok_or_else(|| TimeParseError::InvalidEncoding(unit.to_string()))?
            .trim();

        let time_unit = match unit_word.as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => TimeUnit::Seconds,
            "minutes" | "minute" | "mins" | "min" => TimeUnit::Minutes,
            "hours" | "hour" | "hrs" | "hr" | "h" => TimeUnit::Hours,
            "days" | "day" | "d" => TimeUnit::Days,
            _ => return Err(TimeParseError::InvalidEncoding(unit.to_string())),
        };

        // Base stamps appear with and without a trailing " UTC"
        let base = parse_iso8601(base_str.trim_end_matches(" UTC"))?;

        Ok(Self {
            base,
            unit: time_unit,
        })
    }

    /// Decode one offset value into a UTC timestamp.
    ///
    /// Sub-second precision beyond milliseconds is discarded; the source
    /// formats carry second resolution.
    pub fn decode(&self, offset: f64) -> Option<DateTime<Utc>> {
        if !offset.is_finite() {
            return None;
        }
        let millis = (offset * self.unit.seconds() * 1000.0).round() as i64;
        self.base.checked_add_signed(Duration::milliseconds(millis))
    }

    /// Encode a UTC timestamp back into an offset under this encoding.
    pub fn encode(&self, dt: &DateTime<Utc>) -> f64 {
        let millis = (*dt - self.base).num_milliseconds() as f64;
        millis / 1000.0 / self.unit.seconds()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid time encoding: {0}")]
    InvalidEncoding(String),

    #[error("Window end {end} precedes start {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
