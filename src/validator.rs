//! Validation and cross-referencing of extraction results.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::models::{Day, ExtractionResult, MassTime, ValidationStatus};
use crate::template::ValidationRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    TooFewMasses,
    TooManyMasses,
    NoSundayMasses,
    SundayCountMismatch,
    LargeChangeFromPrevious,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
}

/// The symmetric-difference ratio above which a change-vs-previous issue is
/// raised.
const CHANGE_RATIO_THRESHOLD: f64 = 0.5;

/// Validate an extraction result against a template's rules and the previous
/// extraction, downgrading `validation_status` and `confidence` in place.
///
/// Empty results are always flagged. One lone Sunday-count mismatch downgrades
/// to provisional; any other issue mix flags the result.
pub fn validate(
    result: &mut ExtractionResult,
    rules: &ValidationRules,
    previous_times: Option<&[MassTime]>,
) -> Vec<ValidationIssue> {
    if result.times.is_empty() {
        result.validation_status = ValidationStatus::Flagged;
        result.confidence = 0.0;
        return Vec::new();
    }

    let mut issues = Vec::new();

    if result.times.len() < rules.min_weekly_masses {
        issues.push(ValidationIssue {
            kind: IssueKind::TooFewMasses,
            message: format!(
                "Only {} masses found (min: {})",
                result.times.len(),
                rules.min_weekly_masses
            ),
        });
    }

    if result.times.len() > rules.max_weekly_masses {
        issues.push(ValidationIssue {
            kind: IssueKind::TooManyMasses,
            message: format!(
                "{} masses found (max: {})",
                result.times.len(),
                rules.max_weekly_masses
            ),
        });
    }

    if rules.expected_sunday_count > 0 {
        let sunday_count = result.times.iter().filter(|t| t.day == Day::Sunday).count();
        if sunday_count == 0 {
            issues.push(ValidationIssue {
                kind: IssueKind::NoSundayMasses,
                message: "No Sunday masses found".to_string(),
            });
        } else if sunday_count.abs_diff(rules.expected_sunday_count) > 1 {
            issues.push(ValidationIssue {
                kind: IssueKind::SundayCountMismatch,
                message: format!(
                    "Sunday count {sunday_count} differs from expected {}",
                    rules.expected_sunday_count
                ),
            });
        }
    }

    if let Some(previous) = previous_times {
        let prev_set: HashSet<(Day, &str)> = previous.iter().map(MassTime::key).collect();
        let curr_set: HashSet<(Day, &str)> = result.times.iter().map(MassTime::key).collect();

        if !prev_set.is_empty() && !curr_set.is_empty() {
            let changed = prev_set.symmetric_difference(&curr_set).count();
            let change_ratio = changed as f64 / prev_set.len().max(curr_set.len()) as f64;

            if change_ratio > CHANGE_RATIO_THRESHOLD && rules.alert_if_all_change {
                issues.push(ValidationIssue {
                    kind: IssueKind::LargeChangeFromPrevious,
                    message: format!(
                        "{changed} times changed ({:.0}%), possible extraction error",
                        change_ratio * 100.0
                    ),
                });
            }
        }
    }

    match issues.as_slice() {
        [] => {
            result.validation_status = ValidationStatus::Confirmed;
            // Tier confidence is preserved.
        }
        [only] if only.kind == IssueKind::SundayCountMismatch => {
            result.validation_status = ValidationStatus::Provisional;
            result.confidence = result.confidence.min(0.7);
        }
        _ => {
            result.validation_status = ValidationStatus::Flagged;
            result.confidence = result.confidence.min(0.3);
        }
    }

    if !issues.is_empty() {
        let summary: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
        warn!(parish = %result.parish_id, issues = %summary.join("; "), "validation issues");
        result
            .changes_from_previous
            .extend(issues.iter().map(|i| i.message.clone()));
    }

    issues
}

/// Agreement ratio above which the top two sources confirm each other.
const AGREEMENT_THRESHOLD: f64 = 0.8;

/// Collapse multiple extraction results for one parish into the best one.
///
/// Results are ranked by source priority, then confidence. When the top two
/// sources agree on more than 80% of their `(day, time)` pairs, the best
/// result is confirmed and its confidence boosted (never below the best
/// input's confidence).
pub fn cross_reference(mut results: Vec<ExtractionResult>) -> Option<ExtractionResult> {
    if results.is_empty() {
        return None;
    }
    if results.len() == 1 {
        return results.pop();
    }

    results.sort_by(|a, b| {
        a.source_type
            .priority()
            .cmp(&b.source_type.priority())
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });

    let max_confidence = results
        .iter()
        .map(|r| r.confidence)
        .fold(f64::NEG_INFINITY, f64::max);

    let times_a: HashSet<(Day, String)> = results[0]
        .times
        .iter()
        .map(|t| (t.day, t.time.clone()))
        .collect();
    let times_b: HashSet<(Day, String)> = results[1]
        .times
        .iter()
        .map(|t| (t.day, t.time.clone()))
        .collect();

    let mut best = results.swap_remove(0);

    if !times_a.is_empty() && !times_b.is_empty() {
        let overlap = times_a.intersection(&times_b).count();
        let overlap_ratio = overlap as f64 / times_a.len().max(times_b.len()) as f64;

        if overlap_ratio > AGREEMENT_THRESHOLD {
            let boosted = (best.confidence + 0.1).min(1.0);
            best.confidence = boosted.max(max_confidence.min(1.0));
            best.validation_status = ValidationStatus::Confirmed;
            info!(
                parish = %best.parish_id,
                agreement = format!("{:.0}%", overlap_ratio * 100.0),
                "cross-reference confirms schedule"
            );
        }
    }

    Some(best)
}
