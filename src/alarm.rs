//! # Alarm — Cycle-Based Inspection Staleness
//!
//! Maps an inspection type and the last inspection date to an [`AlarmStatus`].
//!
//! ## Rules
//!
//! Let `days` be the whole calendar days between the last inspection date and
//! today, both taken in the reference timezone, and `cycle` the type's cycle
//! length.
//!
//! | Condition | Status |
//! |-----------|--------|
//! | never inspected | `unknown` |
//! | last date in the future | `normal` |
//! | daily, `days == 0` | `normal` |
//! | daily, `days >= 1` | `alarm` |
//! | `days == 0` | `normal` |
//! | `days >= cycle` | `alarm` |
//! | `days >= cycle - 3` | `warning` |
//! | otherwise | `normal` |
//!
//! Daily equipment compares calendar dates rather than a rolling 24 hour
//! window. Status is always recomputed; it is never persisted.
//!
//! The current date is an explicit argument everywhere in this module.

use crate::inspection::InspectionType;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Days before the end of a cycle at which equipment becomes "due soon".
pub const WARNING_LEAD_DAYS: i64 = 3;

/// Derived inspection status of one piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Normal,
    Warning,
    Alarm,
    Unknown,
}

impl AlarmStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmStatus::Normal => "normal",
            AlarmStatus::Warning => "warning",
            AlarmStatus::Alarm => "alarm",
            AlarmStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid inspection date: {input:?}")]
pub struct InvalidDateError {
    pub input: String,
}

/// The fixed timezone that turns instants into calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone {
    offset: FixedOffset,
}

impl ReferenceZone {
    /// Korea Standard Time, the zone the inspection sheets are kept in.
    pub const DEFAULT_OFFSET_MINUTES: i32 = 9 * 60;

    /// Build a zone from a UTC offset in minutes. Returns `None` outside ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| ReferenceZone { offset })
    }

    pub fn utc() -> Self {
        ReferenceZone { offset: Utc.fix() }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    /// Calendar date of `instant` in this zone.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Alias of [`date_of`](Self::date_of) for the current instant.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.date_of(now)
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        ReferenceZone::from_offset_minutes(Self::DEFAULT_OFFSET_MINUTES)
            .expect("default offset is within range")
    }
}

/// Whole calendar days from `from` to `to` (negative when `from` is later).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// Classify equipment given its last inspection date and today's date.
pub fn classify(kind: InspectionType, last: Option<NaiveDate>, today: NaiveDate) -> AlarmStatus {
    let Some(last) = last else {
        return AlarmStatus::Unknown;
    };
    let days = days_between(last, today);
    if days < 0 {
        return AlarmStatus::Normal;
    }

    let cycle = kind.cycle_days();
    if cycle == 1 {
        return if days == 0 {
            AlarmStatus::Normal
        } else {
            AlarmStatus::Alarm
        };
    }

    if days == 0 {
        AlarmStatus::Normal
    } else if days >= cycle {
        AlarmStatus::Alarm
    } else if days >= cycle - WARNING_LEAD_DAYS {
        AlarmStatus::Warning
    } else {
        AlarmStatus::Normal
    }
}

/// Parse a last-inspection value as reported by a row-store or local history.
///
/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp; timestamps are normalized
/// into `zone` before the date is taken.
pub fn parse_inspection_date(raw: &str, zone: ReferenceZone) -> Result<NaiveDate, InvalidDateError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|ts| zone.date_of(ts.with_timezone(&Utc)))
        .map_err(|_| InvalidDateError {
            input: raw.to_string(),
        })
}

/// Parse-then-classify. Absent input is `unknown`; malformed input is an error
/// the caller decides how to present.
pub fn classify_raw(
    kind: InspectionType,
    raw: Option<&str>,
    today: NaiveDate,
    zone: ReferenceZone,
) -> Result<AlarmStatus, InvalidDateError> {
    let last = raw
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_inspection_date(s, zone))
        .transpose()?;
    Ok(classify(kind, last, today))
}

/// Display label for a status.
pub fn label_for(status: AlarmStatus) -> &'static str {
    match status {
        AlarmStatus::Normal => "OK",
        AlarmStatus::Warning => "Due Soon",
        AlarmStatus::Alarm => "Overdue",
        AlarmStatus::Unknown => "Not Inspected",
    }
}
