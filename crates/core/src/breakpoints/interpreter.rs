//! Breakpoint interpretation.
//!
//! Maps a raw measurement onto Susceptible / Intermediate / Resistant for a given standard and
//! scores how far the measurement sits from the boundary it was judged against.
//!
//! Boundary semantics:
//!
//! - **Disk diffusion** (mm, larger is more susceptible): susceptible when the value is at or
//!   above `susceptible_min`, resistant when at or below `resistant_max`, intermediate between.
//!   Standards without `resistant_max` use `intermediate_min` as the inclusive resistant edge.
//! - **MIC** (µg/mL, smaller is more susceptible): susceptible when the value is at or below
//!   `susceptible_max`, resistant when at or above `resistant_min`, intermediate between.
//!   Standards without `resistant_min` use `intermediate_max` as the inclusive resistant edge.

use super::model::{BreakpointStandard, Confidence, SensitivityResult, TestMethod};
use crate::constants::{
    DISK_HIGH_MARGIN_MM, DISK_MEDIUM_MARGIN_MM, MIC_RESISTANT_HIGH_RATIO,
    MIC_RESISTANT_MEDIUM_RATIO, MIC_SUSCEPTIBLE_HIGH_RATIO, MIC_SUSCEPTIBLE_MEDIUM_RATIO,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Reasons a measurement cannot be interpreted against a standard.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpretError {
    #[error("test value must be a finite, non-negative number (got {0})")]
    InvalidTestValue(f64),
    #[error("{method} standard {standard_id} is missing {missing}")]
    MissingBound {
        standard_id: String,
        method: TestMethod,
        missing: &'static str,
    },
}

/// Outcome of interpreting one measurement against one standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Interpretation {
    pub result: SensitivityResult,
    pub confidence: Confidence,
    /// Distance from the deciding boundary: mm for disk diffusion, value/boundary ratio for MIC.
    /// `None` for intermediate results.
    pub margin: Option<f64>,
    /// E.g. `Zone diameter: 18mm` or `MIC: 2 µg/mL`.
    pub description: String,
}

/// Inclusive boundaries a measurement is categorised against.
struct Edges {
    susceptible: f64,
    resistant: f64,
}

fn edges(standard: &BreakpointStandard) -> Result<Edges, InterpretError> {
    let b = &standard.bounds;
    let missing = |missing: &'static str| InterpretError::MissingBound {
        standard_id: standard.id.to_string(),
        method: standard.method,
        missing,
    };

    match standard.method {
        TestMethod::DiskDiffusion => {
            let susceptible = b.susceptible_min.ok_or_else(|| missing("susceptible_min"))?;
            let resistant = match (b.resistant_max, b.intermediate_min) {
                (Some(r), _) => r,
                (None, Some(i)) => i,
                (None, None) => return Err(missing("resistant_max")),
            };
            Ok(Edges {
                susceptible,
                resistant,
            })
        }
        TestMethod::Mic => {
            let susceptible = b.susceptible_max.ok_or_else(|| missing("susceptible_max"))?;
            let resistant = match (b.resistant_min, b.intermediate_max) {
                (Some(r), _) => r,
                (None, Some(i)) => i,
                (None, None) => return Err(missing("resistant_min")),
            };
            Ok(Edges {
                susceptible,
                resistant,
            })
        }
    }
}

fn categorise(method: TestMethod, edges: &Edges, value: f64) -> SensitivityResult {
    match method {
        TestMethod::DiskDiffusion => {
            if value >= edges.susceptible {
                SensitivityResult::Susceptible
            } else if value <= edges.resistant {
                SensitivityResult::Resistant
            } else {
                SensitivityResult::Intermediate
            }
        }
        TestMethod::Mic => {
            if value <= edges.susceptible {
                SensitivityResult::Susceptible
            } else if value >= edges.resistant {
                SensitivityResult::Resistant
            } else {
                SensitivityResult::Intermediate
            }
        }
    }
}

fn check_value(test_value: f64) -> Result<(), InterpretError> {
    if !test_value.is_finite() || test_value < 0.0 {
        return Err(InterpretError::InvalidTestValue(test_value));
    }
    Ok(())
}

/// Interprets `test_value` against `standard`.
///
/// # Errors
///
/// Returns `InterpretError::InvalidTestValue` for NaN, infinite or negative values and
/// `InterpretError::MissingBound` when the standard lacks the cutoffs its method needs.
pub fn interpret(
    standard: &BreakpointStandard,
    test_value: f64,
) -> Result<Interpretation, InterpretError> {
    check_value(test_value)?;
    let edges = edges(standard)?;
    let result = categorise(standard.method, &edges, test_value);
    let margin = margin(standard.method, &edges, test_value, result);
    let confidence = confidence_from_margin(standard, result, margin);

    Ok(Interpretation {
        result,
        confidence,
        margin,
        description: standard.method.describe_value(test_value),
    })
}

/// Confidence of `result` for `test_value` against `standard`.
///
/// Disk diffusion scores the mm distance from the nearest boundary: 3mm or more is high, 1mm or
/// more is medium. MIC scores the ratio between the value and the boundary: for susceptible
/// calls 0.5 or less is high and 0.8 or less medium; for resistant calls 2 or more is high and
/// 1.5 or more medium. Intermediate results are low when the standard defines an intermediate
/// range and medium when it does not.
///
/// # Errors
///
/// Same as [`interpret`].
pub fn calculate_confidence(
    standard: &BreakpointStandard,
    test_value: f64,
    result: SensitivityResult,
) -> Result<Confidence, InterpretError> {
    check_value(test_value)?;
    let edges = edges(standard)?;
    let margin = margin(standard.method, &edges, test_value, result);
    Ok(confidence_from_margin(standard, result, margin))
}

fn margin(
    method: TestMethod,
    edges: &Edges,
    value: f64,
    result: SensitivityResult,
) -> Option<f64> {
    match (method, result) {
        (_, SensitivityResult::Intermediate) => None,
        (TestMethod::DiskDiffusion, SensitivityResult::Susceptible) => {
            Some(value - edges.susceptible)
        }
        (TestMethod::DiskDiffusion, SensitivityResult::Resistant) => {
            Some(edges.resistant - value)
        }
        (TestMethod::Mic, SensitivityResult::Susceptible) => ratio(value, edges.susceptible),
        (TestMethod::Mic, SensitivityResult::Resistant) => ratio(value, edges.resistant),
    }
}

fn ratio(value: f64, boundary: f64) -> Option<f64> {
    (boundary > 0.0).then(|| value / boundary)
}

fn confidence_from_margin(
    standard: &BreakpointStandard,
    result: SensitivityResult,
    margin: Option<f64>,
) -> Confidence {
    if result == SensitivityResult::Intermediate {
        return if standard.bounds.has_intermediate_range() {
            Confidence::Low
        } else {
            Confidence::Medium
        };
    }

    // A zero MIC boundary leaves no ratio to score.
    let Some(margin) = margin else {
        return Confidence::Medium;
    };

    match (standard.method, result) {
        (TestMethod::DiskDiffusion, _) => {
            if margin >= DISK_HIGH_MARGIN_MM {
                Confidence::High
            } else if margin >= DISK_MEDIUM_MARGIN_MM {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }
        (TestMethod::Mic, SensitivityResult::Susceptible) => {
            if margin <= MIC_SUSCEPTIBLE_HIGH_RATIO {
                Confidence::High
            } else if margin <= MIC_SUSCEPTIBLE_MEDIUM_RATIO {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }
        (TestMethod::Mic, _) => {
            if margin >= MIC_RESISTANT_HIGH_RATIO {
                Confidence::High
            } else if margin >= MIC_RESISTANT_MEDIUM_RATIO {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::model::BreakpointBounds;
    use crate::lifecycle::Lifecycle;
    use chrono::Utc;
    use lims_types::{DrugId, MicroorganismId, StandardId};

    fn standard(method: TestMethod, bounds: BreakpointBounds) -> BreakpointStandard {
        let now = Utc::now();
        BreakpointStandard {
            id: StandardId::parse("std").unwrap(),
            microorganism_id: MicroorganismId::parse("eco").unwrap(),
            drug_id: DrugId::parse("amp").unwrap(),
            year: 2024,
            method,
            bounds,
            notes: None,
            source_document: None,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn disk() -> BreakpointStandard {
        standard(
            TestMethod::DiskDiffusion,
            BreakpointBounds {
                susceptible_min: Some(17.0),
                intermediate_min: Some(14.0),
                intermediate_max: Some(16.0),
                resistant_max: Some(13.0),
                ..Default::default()
            },
        )
    }

    fn mic() -> BreakpointStandard {
        standard(
            TestMethod::Mic,
            BreakpointBounds {
                susceptible_max: Some(2.0),
                intermediate_min: Some(4.0),
                intermediate_max: Some(4.0),
                resistant_min: Some(8.0),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_disk_boundaries() {
        let s = disk();
        assert_eq!(
            interpret(&s, 17.0).unwrap().result,
            SensitivityResult::Susceptible
        );
        assert_eq!(
            interpret(&s, 16.0).unwrap().result,
            SensitivityResult::Intermediate
        );
        assert_eq!(
            interpret(&s, 14.0).unwrap().result,
            SensitivityResult::Intermediate
        );
        assert_eq!(
            interpret(&s, 13.0).unwrap().result,
            SensitivityResult::Resistant
        );
    }

    #[test]
    fn test_disk_margin_of_one_mm_is_medium() {
        let interpretation = interpret(&disk(), 18.0).expect("interpretable");
        assert_eq!(interpretation.result, SensitivityResult::Susceptible);
        assert_eq!(interpretation.margin, Some(1.0));
        assert_eq!(interpretation.confidence, Confidence::Medium);
        assert_eq!(interpretation.description, "Zone diameter: 18mm");
    }

    #[test]
    fn test_disk_confidence_thresholds() {
        let s = disk();
        assert_eq!(interpret(&s, 20.0).unwrap().confidence, Confidence::High);
        assert_eq!(interpret(&s, 17.5).unwrap().confidence, Confidence::Low);
        assert_eq!(interpret(&s, 10.0).unwrap().confidence, Confidence::High);
        assert_eq!(interpret(&s, 12.0).unwrap().confidence, Confidence::Medium);
        assert_eq!(interpret(&s, 13.0).unwrap().confidence, Confidence::Low);
    }

    #[test]
    fn test_mic_half_breakpoint_is_high_confidence() {
        let interpretation = interpret(&mic(), 1.0).expect("interpretable");
        assert_eq!(interpretation.result, SensitivityResult::Susceptible);
        assert_eq!(interpretation.margin, Some(0.5));
        assert_eq!(interpretation.confidence, Confidence::High);
        assert_eq!(interpretation.description, "MIC: 1 µg/mL");
    }

    #[test]
    fn test_mic_boundaries_and_confidence() {
        let s = mic();
        let at_breakpoint = interpret(&s, 2.0).unwrap();
        assert_eq!(at_breakpoint.result, SensitivityResult::Susceptible);
        assert_eq!(at_breakpoint.confidence, Confidence::Low);

        assert_eq!(
            interpret(&s, 1.5).unwrap().confidence,
            Confidence::Medium
        );
        assert_eq!(
            interpret(&s, 4.0).unwrap().result,
            SensitivityResult::Intermediate
        );

        let resistant = interpret(&s, 16.0).unwrap();
        assert_eq!(resistant.result, SensitivityResult::Resistant);
        assert_eq!(resistant.confidence, Confidence::High);
        assert_eq!(interpret(&s, 12.0).unwrap().confidence, Confidence::Medium);
        assert_eq!(interpret(&s, 8.0).unwrap().confidence, Confidence::Low);
    }

    #[test]
    fn test_intermediate_confidence_depends_on_defined_range() {
        assert_eq!(interpret(&disk(), 15.0).unwrap().confidence, Confidence::Low);

        let no_intermediate = standard(
            TestMethod::Mic,
            BreakpointBounds {
                susceptible_max: Some(1.0),
                resistant_min: Some(4.0),
                ..Default::default()
            },
        );
        let interpretation = interpret(&no_intermediate, 2.0).unwrap();
        assert_eq!(interpretation.result, SensitivityResult::Intermediate);
        assert_eq!(interpretation.confidence, Confidence::Medium);
    }

    #[test]
    fn test_intermediate_edge_is_inclusive_without_resistant_bound() {
        let disk = standard(
            TestMethod::DiskDiffusion,
            BreakpointBounds {
                susceptible_min: Some(17.0),
                intermediate_min: Some(14.0),
                ..Default::default()
            },
        );
        assert_eq!(
            interpret(&disk, 14.0).unwrap().result,
            SensitivityResult::Resistant
        );
        assert_eq!(
            interpret(&disk, 14.5).unwrap().result,
            SensitivityResult::Intermediate
        );

        let mic = standard(
            TestMethod::Mic,
            BreakpointBounds {
                susceptible_max: Some(2.0),
                intermediate_max: Some(4.0),
                ..Default::default()
            },
        );
        let at_edge = interpret(&mic, 4.0).unwrap();
        assert_eq!(at_edge.result, SensitivityResult::Resistant);
        assert_eq!(at_edge.margin, Some(1.0));
        assert_eq!(
            interpret(&mic, 3.0).unwrap().result,
            SensitivityResult::Intermediate
        );
    }

    #[test]
    fn test_disk_monotonic_in_test_value() {
        let s = disk();
        let mut previous = SensitivityResult::Resistant;
        for tenth in 0..400 {
            let value = tenth as f64 / 10.0;
            let result = interpret(&s, value).unwrap().result;
            assert!(
                result.severity() <= previous.severity(),
                "{value}mm moved from {previous} to {result}"
            );
            previous = result;
        }
    }

    #[test]
    fn test_mic_monotonic_in_test_value() {
        let s = mic();
        let mut previous = SensitivityResult::Susceptible;
        for step in 0..200 {
            let value = step as f64 * 0.125;
            let result = interpret(&s, value).unwrap().result;
            assert!(
                result.severity() >= previous.severity(),
                "{value} µg/mL moved from {previous} to {result}"
            );
            previous = result;
        }
    }

    #[test]
    fn test_rejects_invalid_values_and_incomplete_standards() {
        assert!(matches!(
            interpret(&disk(), f64::NAN),
            Err(InterpretError::InvalidTestValue(_))
        ));
        assert!(matches!(
            interpret(&mic(), -1.0),
            Err(InterpretError::InvalidTestValue(_))
        ));

        let incomplete = standard(
            TestMethod::DiskDiffusion,
            BreakpointBounds {
                susceptible_min: Some(17.0),
                ..Default::default()
            },
        );
        assert!(matches!(
            interpret(&incomplete, 15.0),
            Err(InterpretError::MissingBound {
                missing: "resistant_max",
                ..
            })
        ));
    }

    #[test]
    fn test_calculate_confidence_for_explicit_result() {
        let confidence =
            calculate_confidence(&disk(), 22.0, SensitivityResult::Susceptible).unwrap();
        assert_eq!(confidence, Confidence::High);
    }
}
