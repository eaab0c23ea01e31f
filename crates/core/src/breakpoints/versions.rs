//! Year-over-year comparison of breakpoint standards.
//!
//! Purely informational: it reports what changed between consecutive published years of the
//! same organism, drug and method, for audit and compliance reporting.

use super::model::{format_number, BreakpointStandard, TestMethod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Which part of a standard changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    SusceptibleRange,
    IntermediateRange,
    ResistantRange,
    Notes,
}

impl ChangeType {
    fn label(self) -> &'static str {
        match self {
            ChangeType::SusceptibleRange => "Susceptible range",
            ChangeType::IntermediateRange => "Intermediate range",
            ChangeType::ResistantRange => "Resistant range",
            ChangeType::Notes => "Notes",
        }
    }
}

/// One changed field group between two consecutive years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BreakpointChange {
    pub method: TestMethod,
    pub year: i32,
    pub previous_year: i32,
    pub change_type: ChangeType,
    pub old_value: String,
    pub new_value: String,
    pub description: String,
}

fn format_range(min: Option<f64>, max: Option<f64>, unit: &str) -> String {
    match (min, max) {
        (Some(min), Some(max)) if min == max => format!("{} {unit}", format_number(min)),
        (Some(min), Some(max)) => {
            format!("{} to {} {unit}", format_number(min), format_number(max))
        }
        (Some(min), None) => format!(">= {} {unit}", format_number(min)),
        (None, Some(max)) => format!("<= {} {unit}", format_number(max)),
        (None, None) => "not defined".to_owned(),
    }
}

/// Notes as compared and reported: trimmed, with blank notes treated as absent.
fn normalised_notes(notes: Option<&str>) -> Option<&str> {
    notes.map(str::trim).filter(|n| !n.is_empty())
}

fn format_notes(notes: Option<&str>) -> String {
    match notes {
        Some(n) => format!("'{n}'"),
        None => "none".to_owned(),
    }
}

fn diff_pair(previous: &BreakpointStandard, current: &BreakpointStandard) -> Vec<BreakpointChange> {
    let unit = current.method.unit();
    let p = &previous.bounds;
    let c = &current.bounds;

    let groups = [
        (
            ChangeType::SusceptibleRange,
            (p.susceptible_min, p.susceptible_max),
            (c.susceptible_min, c.susceptible_max),
        ),
        (
            ChangeType::IntermediateRange,
            (p.intermediate_min, p.intermediate_max),
            (c.intermediate_min, c.intermediate_max),
        ),
        (
            ChangeType::ResistantRange,
            (p.resistant_min, p.resistant_max),
            (c.resistant_min, c.resistant_max),
        ),
    ];

    let mut changes = Vec::new();
    let mut push = |change_type: ChangeType, old_value: String, new_value: String| {
        let description = format!(
            "{} changed from {} to {} ({} -> {})",
            change_type.label(),
            old_value,
            new_value,
            previous.year,
            current.year
        );
        changes.push(BreakpointChange {
            method: current.method,
            year: current.year,
            previous_year: previous.year,
            change_type,
            old_value,
            new_value,
            description,
        });
    };

    for (change_type, old, new) in groups {
        if old != new {
            push(
                change_type,
                format_range(old.0, old.1, unit),
                format_range(new.0, new.1, unit),
            );
        }
    }

    let old_notes = normalised_notes(previous.notes.as_deref());
    let new_notes = normalised_notes(current.notes.as_deref());
    if old_notes != new_notes {
        push(
            ChangeType::Notes,
            format_notes(old_notes),
            format_notes(new_notes),
        );
    }

    changes
}

/// Reports every change between consecutive years of the given standards.
///
/// Standards are grouped by method (optionally restricted to `method`), ordered by ascending
/// year and compared pairwise. When two standards share a year only the first one seen takes
/// part; the duplicate is logged. A single-year history yields no changes.
pub fn compare(
    standards: &[BreakpointStandard],
    method: Option<TestMethod>,
) -> Vec<BreakpointChange> {
    let mut by_method: BTreeMap<TestMethod, Vec<&BreakpointStandard>> = BTreeMap::new();
    for standard in standards
        .iter()
        .filter(|s| method.map_or(true, |m| s.method == m))
    {
        by_method.entry(standard.method).or_default().push(standard);
    }

    let mut changes = Vec::new();
    for (method, mut history) in by_method {
        history.sort_by_key(|s| s.year);
        history.dedup_by(|later, earlier| {
            let duplicate = later.year == earlier.year;
            if duplicate {
                tracing::warn!(
                    method = %method,
                    year = later.year,
                    kept = %earlier.id,
                    ignored = %later.id,
                    "duplicate breakpoint standard year in history"
                );
            }
            duplicate
        });

        for pair in history.windows(2) {
            changes.extend(diff_pair(pair[0], pair[1]));
        }
    }

    changes
}
