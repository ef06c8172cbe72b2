//! Structural checks for a daily panel before analysis.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::output::PanelData;

/// Readings above this are flagged as suspicious but not rejected.
pub const HUGE_READING: f64 = 1e9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("panel has no valid rows")]
    Empty,

    #[error("{count} malformed row(s); first at line {first_line}: {message}")]
    MalformedRows {
        count: usize,
        first_line: usize,
        message: String,
    },

    #[error("found {0} duplicate (date, fingerprint) rows")]
    Duplicates(usize),

    #[error(
        "date coverage has gaps: missing {} day(s); first few: {}",
        .missing.len(),
        preview(.missing)
    )]
    DateGaps { missing: Vec<NaiveDate> },

    #[error("node set on {date} differs from the common set: missing {missing}, extra {extra}")]
    CommonSetMismatch {
        date: NaiveDate,
        missing: usize,
        extra: usize,
    },

    #[error("row count mismatch: rows={rows} but days x common={expected}")]
    RowCountMismatch { rows: usize, expected: usize },
}

fn preview(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .take(10)
        .map(NaiveDate::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub days: usize,
    pub common_nodes: usize,
    pub rows: usize,
    pub zero_readings: usize,
    pub huge_readings: usize,
}

/// Checks that a panel is a complete rectangle: one row per node per day,
/// contiguous days, and the same node set on every day.
pub fn validate_panel(panel: &PanelData) -> Result<ValidationSummary, ValidationError> {
    if let Some(first) = panel.row_errors.first() {
        return Err(ValidationError::MalformedRows {
            count: panel.row_errors.len(),
            first_line: first.line,
            message: first.message.clone(),
        });
    }

    let observations = &panel.observations;
    let (Some(first_date), Some(last_date)) = (panel.first_date(), panel.last_date()) else {
        return Err(ValidationError::Empty);
    };

    let mut seen = HashSet::new();
    let duplicates = observations
        .iter()
        .filter(|o| !seen.insert((o.date(), o.node_id())))
        .count();
    if duplicates > 0 {
        return Err(ValidationError::Duplicates(duplicates));
    }

    let mut by_day: BTreeMap<NaiveDate, BTreeSet<&str>> = BTreeMap::new();
    for obs in observations {
        by_day.entry(obs.date()).or_default().insert(obs.node_id());
    }

    let missing: Vec<NaiveDate> = first_date
        .iter_days()
        .take_while(|d| *d <= last_date)
        .filter(|d| !by_day.contains_key(d))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::DateGaps { missing });
    }

    let mut day_sets = by_day.values();
    let mut common = day_sets.next().cloned().unwrap_or_default();
    for set in day_sets {
        common.retain(|node| set.contains(node));
    }
    for (date, set) in &by_day {
        if *set != common {
            return Err(ValidationError::CommonSetMismatch {
                date: *date,
                missing: common.difference(set).count(),
                extra: set.difference(&common).count(),
            });
        }
    }

    let days = by_day.len();
    let expected = days * common.len();
    if observations.len() != expected {
        return Err(ValidationError::RowCountMismatch {
            rows: observations.len(),
            expected,
        });
    }

    Ok(ValidationSummary {
        first_date,
        last_date,
        days,
        common_nodes: common.len(),
        rows: observations.len(),
        zero_readings: observations.iter().filter(|o| o.value() == 0.0).count(),
        huge_readings: observations.iter().filter(|o| o.value() > HUGE_READING).count(),
    })
}
