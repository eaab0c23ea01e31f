//! Input validation utilities.
//!
//! This module contains functions for validating user inputs to ensure they meet
//! safety and correctness requirements before they reach the record store or the
//! interpretation pipeline.

use crate::breakpoints::{BreakpointBounds, TestMethod};
use crate::{CoreError, CoreResult};

/// Earliest standard year accepted.
pub const MIN_STANDARD_YEAR: i32 = 1950;

/// Latest standard year accepted.
pub const MAX_STANDARD_YEAR: i32 = 2100;

/// Validates that a year is plausible for a published breakpoint standard.
pub fn validate_year(year: i32) -> CoreResult<()> {
    if !(MIN_STANDARD_YEAR..=MAX_STANDARD_YEAR).contains(&year) {
        return Err(CoreError::InvalidInput(format!(
            "year {year} is outside {MIN_STANDARD_YEAR}..={MAX_STANDARD_YEAR}"
        )));
    }
    Ok(())
}

/// Validates the cutoffs of a breakpoint standard against its test method.
///
/// Disk diffusion needs a susceptible lower bound and either a resistant upper bound or an
/// intermediate lower bound; MIC needs a susceptible upper bound and either a resistant lower
/// bound or an intermediate upper bound. The susceptible and resistant ranges must not overlap.
///
/// # Errors
///
/// Returns `CoreError::InvalidInput` describing the first problem found.
pub fn validate_bounds(method: TestMethod, bounds: &BreakpointBounds) -> CoreResult<()> {
    for (name, value) in bounds.named() {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(CoreError::InvalidInput(format!(
                    "{name} must be a finite, non-negative number"
                )));
            }
        }
    }

    let pairs = [
        ("susceptible", bounds.susceptible_min, bounds.susceptible_max),
        ("intermediate", bounds.intermediate_min, bounds.intermediate_max),
        ("resistant", bounds.resistant_min, bounds.resistant_max),
    ];
    for (name, min, max) in pairs {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(CoreError::InvalidInput(format!(
                    "{name} range minimum {min} exceeds maximum {max}"
                )));
            }
        }
    }

    match method {
        TestMethod::DiskDiffusion => {
            let s_min = bounds.susceptible_min.ok_or_else(|| {
                CoreError::InvalidInput("disk diffusion standards need susceptible_min".into())
            })?;
            let (edge_name, r_edge) = match (bounds.resistant_max, bounds.intermediate_min) {
                (Some(r), _) => ("resistant_max", r),
                (None, Some(i)) => ("intermediate_min", i),
                (None, None) => {
                    return Err(CoreError::InvalidInput(
                        "disk diffusion standards need resistant_max or intermediate_min".into(),
                    ))
                }
            };
            if s_min <= r_edge {
                return Err(CoreError::InvalidInput(format!(
                    "susceptible_min {s_min} must be greater than {edge_name} {r_edge}"
                )));
            }
        }
        TestMethod::Mic => {
            let s_max = bounds.susceptible_max.ok_or_else(|| {
                CoreError::InvalidInput("MIC standards need susceptible_max".into())
            })?;
            let (edge_name, r_edge) = match (bounds.resistant_min, bounds.intermediate_max) {
                (Some(r), _) => ("resistant_min", r),
                (None, Some(i)) => ("intermediate_max", i),
                (None, None) => {
                    return Err(CoreError::InvalidInput(
                        "MIC standards need resistant_min or intermediate_max".into(),
                    ))
                }
            };
            if s_max >= r_edge {
                return Err(CoreError::InvalidInput(format!(
                    "susceptible_max {s_max} must be less than {edge_name} {r_edge}"
                )));
            }
        }
    }

    Ok(())
}

/// Validates that a record identifier is safe to use as a file stem in the YAML store.
///
/// Only ASCII alphanumerics, '-' and '_' are allowed, which rules out path separators and
/// traversal sequences.
pub fn validate_record_file_stem(id: &str) -> CoreResult<()> {
    let ok = !id.is_empty()
        && id
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_'));

    if !ok {
        return Err(CoreError::InvalidInput(format!(
            "record id '{id}' contains characters not allowed in storage (only alphanumeric, '-', '_')"
        )));
    }
    Ok(())
}
