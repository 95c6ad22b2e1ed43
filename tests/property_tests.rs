//! Property-based tests for facsys's pure building blocks.
//!
//! These tests use the `proptest` framework to check invariants across many
//! randomly generated inputs: the overdue classifier, check-content encoding,
//! completion tiles, and scope filtering.
//!
//! # How to run
//!
//! ```bash
//! # Run all property tests:
//! cargo test --test property_tests
//!
//! # Increase case count for thorough testing (default is 256):
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! Each property is named `prop_<function>_<invariant>`.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use facsys::alarm::{classify, AlarmStatus, ReferenceZone};
use facsys::completion::{completion_rate, TileStatus};
use facsys::connector::{filter_by_scope, EquipmentSnapshot};
use facsys::inspection::{CheckResult, InspectionType, SiteScope};
use facsys::row::{format_check_content, parse_check_content};
use proptest::prelude::*;

fn any_type() -> impl Strategy<Value = InspectionType> {
    prop::sample::select(InspectionType::ALL.to_vec())
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

fn severity(status: AlarmStatus) -> u8 {
    match status {
        AlarmStatus::Normal => 0,
        AlarmStatus::Warning => 1,
        AlarmStatus::Alarm => 2,
        AlarmStatus::Unknown => 3,
    }
}

// == Classifier ================================================================

proptest! {
    /// A full cycle or more since the last inspection is always overdue.
    #[test]
    fn prop_classify_alarm_once_cycle_elapsed(kind in any_type(), extra in 0i64..1000) {
        let last = today() - Duration::days(kind.cycle_days() + extra);
        prop_assert_eq!(classify(kind, Some(last), today()), AlarmStatus::Alarm);
    }

    /// Inspected today, or dated in the future, is never flagged.
    #[test]
    fn prop_classify_today_and_future_are_normal(kind in any_type(), ahead in 0i64..400) {
        let last = today() + Duration::days(ahead);
        prop_assert_eq!(classify(kind, Some(last), today()), AlarmStatus::Normal);
    }

    /// Status only gets worse as the last inspection recedes.
    #[test]
    fn prop_classify_monotone_in_elapsed_days(kind in any_type(), a in 0i64..800, b in 0i64..800) {
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        let near_status = classify(kind, Some(today() - Duration::days(near)), today());
        let far_status = classify(kind, Some(today() - Duration::days(far)), today());
        prop_assert!(severity(near_status) <= severity(far_status),
            "{:?}: {} days -> {:?}, {} days -> {:?}", kind, near, near_status, far, far_status);
    }

    /// Daily inspections have no warning window.
    #[test]
    fn prop_classify_daily_is_never_warning(days in 0i64..30) {
        let status = classify(InspectionType::Daily, Some(today() - Duration::days(days)), today());
        prop_assert_ne!(status, AlarmStatus::Warning);
    }

    /// Calendar dates in a zone stay within a day of the UTC date.
    #[test]
    fn prop_zone_date_within_a_day_of_utc(secs in 0i64..2_000_000_000, offset in -720i32..=840) {
        let zone = ReferenceZone::from_offset_minutes(offset).unwrap();
        let instant = Utc.timestamp_opt(secs, 0).unwrap();
        let local = zone.date_of(instant);
        let gap = (local - instant.date_naive()).num_days();
        prop_assert!((-1..=1).contains(&gap));
    }
}

// == Check content =============================================================

proptest! {
    /// Item/result pairs free of separators survive formatting and parsing.
    #[test]
    fn prop_check_content_roundtrip(
        pairs in prop::collection::vec(("[a-z가-힣]{1,8}", "[a-z가-힣 ]{0,8}"), 0..6),
    ) {
        let checks: Vec<CheckResult> = pairs
            .iter()
            .map(|(item, result)| CheckResult::new(item.as_str(), result.trim()))
            .collect();
        let content = format_check_content(&checks);
        prop_assert_eq!(parse_check_content(&content), checks);
    }
}

// == Completion ================================================================

proptest! {
    /// Percentages stay in range and agree with the tile thresholds.
    #[test]
    fn prop_completion_rate_consistent(
        kind in any_type(),
        ages in prop::collection::vec(prop::option::of(0i64..400), 1..40),
    ) {
        let equipment: Vec<String> = (0..ages.len()).map(|i| format!("E{i}")).collect();
        let snapshots: Vec<EquipmentSnapshot> = ages
            .iter()
            .enumerate()
            .map(|(i, age)| {
                let date = age.map(|d| (today() - Duration::days(d)).format("%Y-%m-%d").to_string());
                EquipmentSnapshot::new(format!("e{i}"), date)
            })
            .collect();

        let rate = completion_rate(kind, &equipment, &snapshots, today(), ReferenceZone::default());
        prop_assert_eq!(rate.total, equipment.len());
        prop_assert!(rate.completed <= rate.total);
        prop_assert!(rate.percentage <= 100);
        let expected = if rate.percentage < 50 {
            TileStatus::Alarm
        } else if rate.percentage < 80 {
            TileStatus::Warning
        } else {
            TileStatus::Completed
        };
        prop_assert_eq!(rate.status, expected);

        let normal = ages
            .iter()
            .filter(|age| {
                age.map(|d| classify(kind, Some(today() - Duration::days(d)), today()) == AlarmStatus::Normal)
                    .unwrap_or(false)
            })
            .count();
        prop_assert_eq!(rate.completed, normal);
    }
}

// == Scope filtering ===========================================================

proptest! {
    /// Kept entries always carry the requested scope; nothing tagged for
    /// another scope leaks through.
    #[test]
    fn prop_filter_by_scope_never_leaks(
        tags in prop::collection::vec(prop::option::of(prop::sample::select(vec!["1-A", "1-B", "1-C"])), 0..20),
        requested in prop::sample::select(vec!["1-A", "1-B", "1-C"]),
    ) {
        let entries: Vec<EquipmentSnapshot> = tags
            .iter()
            .enumerate()
            .map(|(i, tag)| {
                let mut entry = EquipmentSnapshot::new(format!("E{i}"), None);
                entry.sheet_name = tag.map(str::to_string);
                entry
            })
            .collect();
        let primary = SiteScope::new("1-A").unwrap();
        let scope = SiteScope::new(requested).unwrap();

        let kept = filter_by_scope(entries, &scope, &primary);
        prop_assert!(kept.iter().all(|e| e.sheet_name.as_deref() == Some(requested)));

        let tagged = tags.iter().filter(|t| **t == Some(requested)).count();
        let untagged = tags.iter().filter(|t| t.is_none()).count();
        let expected = if requested == "1-A" { tagged + untagged } else { tagged };
        prop_assert_eq!(kept.len(), expected);
    }
}
