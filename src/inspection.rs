//! # Inspection — Core Data Model
//!
//! Inspection cadences, site scopes, and the submission unit that becomes one
//! spreadsheet row.
//!
//! ## Cadences
//!
//! | Type | Cycle (days) | Sheet label |
//! |------|--------------|-------------|
//! | `daily` | 1 | `일일점검` |
//! | `weekly` | 7 | `주간점검` |
//! | `monthly` | 30 | `월간점검` |
//! | `quarterly` | 90 | `분기점검` |
//! | `semiannual` | 180 | `반기점검` |
//! | `annual` | 365 | `연간점검` |
//!
//! The sheet label is what the spreadsheet backend stores in column B and
//! expects in the `type` request field, so it is part of the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Inspection cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl InspectionType {
    pub const ALL: [InspectionType; 6] = [
        InspectionType::Daily,
        InspectionType::Weekly,
        InspectionType::Monthly,
        InspectionType::Quarterly,
        InspectionType::Semiannual,
        InspectionType::Annual,
    ];

    /// Days between required inspections.
    pub fn cycle_days(self) -> i64 {
        match self {
            InspectionType::Daily => 1,
            InspectionType::Weekly => 7,
            InspectionType::Monthly => 30,
            InspectionType::Quarterly => 90,
            InspectionType::Semiannual => 180,
            InspectionType::Annual => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InspectionType::Daily => "daily",
            InspectionType::Weekly => "weekly",
            InspectionType::Monthly => "monthly",
            InspectionType::Quarterly => "quarterly",
            InspectionType::Semiannual => "semiannual",
            InspectionType::Annual => "annual",
        }
    }

    /// Label used in the spreadsheet's type column and the `type` request field.
    pub fn sheet_label(self) -> &'static str {
        match self {
            InspectionType::Daily => "일일점검",
            InspectionType::Weekly => "주간점검",
            InspectionType::Monthly => "월간점검",
            InspectionType::Quarterly => "분기점검",
            InspectionType::Semiannual => "반기점검",
            InspectionType::Annual => "연간점검",
        }
    }
}

impl fmt::Display for InspectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown inspection type: {0:?}")]
pub struct UnknownInspectionType(pub String);

impl FromStr for InspectionType {
    type Err = UnknownInspectionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        InspectionType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed) || t.sheet_label() == trimmed)
            .ok_or_else(|| UnknownInspectionType(s.to_string()))
    }
}

/// Team/site identifier partitioning equipment and inspection data.
///
/// Maps to a sheet tab on the remote row-store (e.g. `1-A`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteScope(String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("site scope must not be empty")]
pub struct EmptyScope;

impl SiteScope {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyScope> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(EmptyScope);
        }
        Ok(SiteScope(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SiteScope {
    type Err = EmptyScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SiteScope::new(s)
    }
}

impl TryFrom<String> for SiteScope {
    type Error = EmptyScope;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SiteScope::new(value)
    }
}

impl From<SiteScope> for String {
    fn from(scope: SiteScope) -> Self {
        scope.0
    }
}

/// One checklist line: the item that was checked and its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub item: String,
    pub result: String,
}

impl CheckResult {
    pub fn new(item: impl Into<String>, result: impl Into<String>) -> Self {
        CheckResult {
            item: item.into(),
            result: result.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("equipment name must not be empty")]
    EmptyEquipment,
    #[error("check item {0:?} appears more than once")]
    DuplicateItem(String),
}

/// The submission unit: one equipment, one inspection type, one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionRecord {
    kind: InspectionType,
    equipment: String,
    checks: Vec<CheckResult>,
    notes: String,
    location: String,
    inspector: String,
    submitted_at: DateTime<Utc>,
}

impl InspectionRecord {
    /// Build a record, stamping it with the submission instant.
    ///
    /// Item names must be unique within the record.
    pub fn new(
        kind: InspectionType,
        equipment: impl Into<String>,
        checks: Vec<CheckResult>,
        notes: impl Into<String>,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        let equipment = equipment.into();
        if equipment.trim().is_empty() {
            return Err(RecordError::EmptyEquipment);
        }
        let mut seen = HashSet::new();
        for check in &checks {
            if !seen.insert(check.item.as_str()) {
                return Err(RecordError::DuplicateItem(check.item.clone()));
            }
        }
        Ok(InspectionRecord {
            kind,
            equipment,
            checks,
            notes: notes.into(),
            location: String::new(),
            inspector: String::new(),
            submitted_at,
        })
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_inspector(mut self, inspector: impl Into<String>) -> Self {
        self.inspector = inspector.into();
        self
    }

    pub fn kind(&self) -> InspectionType {
        self.kind
    }

    pub fn equipment(&self) -> &str {
        &self.equipment
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn inspector(&self) -> &str {
        &self.inspector
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 1, 0, 0).unwrap()
    }

    #[test]
    fn cycle_lengths_match_table() {
        let cycles: Vec<i64> = InspectionType::ALL.iter().map(|t| t.cycle_days()).collect();
        assert_eq!(cycles, vec![1, 7, 30, 90, 180, 365]);
    }

    #[test]
    fn parse_accepts_canonical_and_sheet_labels() {
        assert_eq!("weekly".parse::<InspectionType>().unwrap(), InspectionType::Weekly);
        assert_eq!(" Annual ".parse::<InspectionType>().unwrap(), InspectionType::Annual);
        assert_eq!("분기점검".parse::<InspectionType>().unwrap(), InspectionType::Quarterly);
        assert!("fortnightly".parse::<InspectionType>().is_err());
    }

    #[test]
    fn type_serializes_lowercase() {
        let json = serde_json::to_string(&InspectionType::Semiannual).unwrap();
        assert_eq!(json, "\"semiannual\"");
    }

    #[test]
    fn scope_rejects_blank_and_trims() {
        assert_eq!(SiteScope::new("  "), Err(EmptyScope));
        assert_eq!(SiteScope::new(" 1-B ").unwrap().as_str(), "1-B");
        let parsed: Result<SiteScope, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn record_rejects_duplicate_items() {
        let checks = vec![CheckResult::new("Oil", "done"), CheckResult::new("Oil", "skip")];
        let err = InspectionRecord::new(InspectionType::Weekly, "Pump", checks, "", at()).unwrap_err();
        assert_eq!(err, RecordError::DuplicateItem("Oil".to_string()));
    }

    #[test]
    fn record_rejects_blank_equipment() {
        let err = InspectionRecord::new(InspectionType::Daily, " ", vec![], "", at()).unwrap_err();
        assert_eq!(err, RecordError::EmptyEquipment);
    }

    #[test]
    fn record_keeps_check_order_and_optional_fields() {
        let checks = vec![CheckResult::new("Oil", "done"), CheckResult::new("Leak", "done")];
        let record = InspectionRecord::new(InspectionType::Monthly, "Chiller", checks, "none", at())
            .unwrap()
            .with_location("Bldg 1")
            .with_inspector("kim");
        assert_eq!(record.checks()[0].item, "Oil");
        assert_eq!(record.checks()[1].item, "Leak");
        assert_eq!(record.location(), "Bldg 1");
        assert_eq!(record.inspector(), "kim");
        assert_eq!(record.submitted_at(), at());
    }
}
