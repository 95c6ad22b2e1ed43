//! # Row — Seven-Column Inspection Row
//!
//! Column order is a compatibility contract with the existing sheets:
//!
//! | Col | Field | Source |
//! |-----|-------|--------|
//! | A | date | submission instant in the reference zone, `YYYY-MM-DD` |
//! | B | inspection type | sheet label (`주간점검`, ...) |
//! | C | equipment name | |
//! | D | location | may be empty |
//! | E | inspector | may be empty |
//! | F | check content | `"item: result"` pairs joined by `", "` |
//! | G | notes | |

use crate::alarm::ReferenceZone;
use crate::inspection::{CheckResult, InspectionRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ROW_WIDTH: usize = 7;

const PAIR_SEPARATOR: &str = ", ";
const ITEM_SEPARATOR: &str = ": ";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("row has {0} fields, expected 7")]
    Width(usize),
}

/// One inspection row, ready to append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InspectionRow([String; ROW_WIDTH]);

impl InspectionRow {
    pub fn from_record(record: &InspectionRecord, zone: ReferenceZone) -> Self {
        InspectionRow([
            zone.date_of(record.submitted_at()).format("%Y-%m-%d").to_string(),
            record.kind().sheet_label().to_string(),
            record.equipment().to_string(),
            record.location().to_string(),
            record.inspector().to_string(),
            format_check_content(record.checks()),
            record.notes().to_string(),
        ])
    }

    /// Read a row back by position.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self, RowError> {
        if fields.len() != ROW_WIDTH {
            return Err(RowError::Width(fields.len()));
        }
        Ok(InspectionRow(std::array::from_fn(|i| {
            fields[i].as_ref().to_string()
        })))
    }

    pub fn fields(&self) -> &[String; ROW_WIDTH] {
        &self.0
    }

    pub fn date(&self) -> &str {
        &self.0[0]
    }

    pub fn inspection_type(&self) -> &str {
        &self.0[1]
    }

    pub fn equipment(&self) -> &str {
        &self.0[2]
    }

    pub fn location(&self) -> &str {
        &self.0[3]
    }

    pub fn inspector(&self) -> &str {
        &self.0[4]
    }

    pub fn check_content(&self) -> &str {
        &self.0[5]
    }

    pub fn notes(&self) -> &str {
        &self.0[6]
    }

    pub fn checks(&self) -> Vec<CheckResult> {
        parse_check_content(self.check_content())
    }

    /// JSON array form sent as the `data` request field.
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self.0.to_vec()).to_string()
    }
}

/// Join checks as `"item: result"` separated by `", "`.
pub fn format_check_content(checks: &[CheckResult]) -> String {
    checks
        .iter()
        .map(|c| format!("{}{ITEM_SEPARATOR}{}", c.item, c.result))
        .collect::<Vec<_>>()
        .join(PAIR_SEPARATOR)
}

/// Inverse of [`format_check_content`]. A segment without `": "` becomes an
/// item with an empty result.
pub fn parse_check_content(content: &str) -> Vec<CheckResult> {
    if content.is_empty() {
        return Vec::new();
    }
    content
        .split(PAIR_SEPARATOR)
        .map(|pair| match pair.split_once(ITEM_SEPARATOR) {
            Some((item, result)) => CheckResult::new(item, result),
            None => CheckResult::new(pair, ""),
        })
        .collect()
}
