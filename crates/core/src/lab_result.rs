//! Lab results and their validation workflow.
//!
//! A [`LabResult`] is owned by the surrounding record-keeping layer. The core writes the
//! outcome of an interpretation onto it and drives the review state machine:
//!
//! ```text
//! PENDING ──────────┐
//!   │               ├──review──> VALIDATED | REJECTED
//! REQUIRES_REVIEW ──┘
//! ```
//!
//! Re-interpretation is allowed until the result is finalised.

use crate::breakpoints::{SensitivityResult, TestMethod};
use crate::error::{CoreError, CoreResult};
use crate::interpretation::InterpretationResult;
use chrono::{DateTime, Utc};
use lims_types::{DrugId, LabResultId, MicroorganismId, NonEmptyText, RuleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Validated,
    Rejected,
    RequiresReview,
}

impl ValidationStatus {
    /// Validated and rejected results are final.
    pub fn is_final(self) -> bool {
        matches!(self, ValidationStatus::Validated | ValidationStatus::Rejected)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::Validated => "VALIDATED",
            ValidationStatus::Rejected => "REJECTED",
            ValidationStatus::RequiresReview => "REQUIRES_REVIEW",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// A susceptibility measurement and its interpreted, validated outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LabResult {
    pub id: LabResultId,
    pub sample_id: String,
    pub microorganism_id: MicroorganismId,
    pub drug_id: DrugId,
    pub test_method: TestMethod,
    /// Zone diameter in mm or MIC in µg/mL.
    pub raw_result: f64,
    /// Guideline year to interpret against; the latest standard when absent.
    #[serde(default)]
    pub test_year: Option<i32>,
    #[serde(default)]
    pub interpretation: Option<SensitivityResult>,
    #[serde(default)]
    pub breakpoint_used: Option<String>,
    /// JSON array of the triggered rule ids.
    #[serde(default)]
    pub expert_rule_applied: Option<String>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub validation_comments: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quality_control_passed: Option<bool>,
}

impl LabResult {
    /// A new, uninterpreted result.
    pub fn new(
        id: LabResultId,
        sample_id: impl Into<String>,
        microorganism_id: MicroorganismId,
        drug_id: DrugId,
        test_method: TestMethod,
        raw_result: f64,
    ) -> Self {
        Self {
            id,
            sample_id: sample_id.into(),
            microorganism_id,
            drug_id,
            test_method,
            raw_result,
            test_year: None,
            interpretation: None,
            breakpoint_used: None,
            expert_rule_applied: None,
            validation_status: ValidationStatus::Pending,
            validation_comments: None,
            reviewed_by: None,
            reviewed_at: None,
            quality_control_passed: None,
        }
    }

    /// Writes an interpretation outcome onto this result.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the result has already been finalised.
    pub fn apply_interpretation(&mut self, outcome: &InterpretationResult) -> CoreResult<()> {
        if self.validation_status.is_final() {
            return Err(CoreError::InvalidTransition {
                from: self.validation_status,
                to: outcome.status_hint,
            });
        }

        let rule_ids = outcome.validation.triggered_rule_ids();
        self.expert_rule_applied =
            Some(serde_json::to_string(&rule_ids).map_err(CoreError::JsonSerialization)?);
        self.interpretation = Some(outcome.final_result);
        self.breakpoint_used = Some(outcome.breakpoint_used.clone());
        self.validation_status = outcome.status_hint;
        self.validation_comments = Some(outcome.comments.clone()).filter(|c| !c.is_empty());
        self.quality_control_passed = Some(outcome.validation.quality_control_passed);
        Ok(())
    }

    /// Records a human review decision.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the result is already validated or rejected.
    pub fn review(
        &mut self,
        reviewer: &NonEmptyText,
        decision: ReviewDecision,
        comments: Option<String>,
    ) -> CoreResult<()> {
        let to = match decision {
            ReviewDecision::Approve => ValidationStatus::Validated,
            ReviewDecision::Reject => ValidationStatus::Rejected,
        };
        if self.validation_status.is_final() {
            return Err(CoreError::InvalidTransition {
                from: self.validation_status,
                to,
            });
        }

        self.validation_status = to;
        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(Utc::now());
        if let Some(comments) = comments.filter(|c| !c.trim().is_empty()) {
            self.validation_comments = Some(match self.validation_comments.take() {
                Some(existing) => format!("{existing}; {comments}"),
                None => comments,
            });
        }
        Ok(())
    }

    /// The triggered rule ids recorded by the last interpretation.
    pub fn triggered_rule_ids(&self) -> CoreResult<Vec<RuleId>> {
        match &self.expert_rule_applied {
            None => Ok(Vec::new()),
            Some(json) => serde_json::from_str(json).map_err(CoreError::JsonSerialization),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab_result() -> LabResult {
        LabResult::new(
            LabResultId::parse("lr-1").unwrap(),
            "S-2024-0001",
            MicroorganismId::parse("eco").unwrap(),
            DrugId::parse("cip").unwrap(),
            TestMethod::Mic,
            0.25,
        )
    }

    #[test]
    fn test_review_finalises_once() {
        let reviewer = NonEmptyText::new("dr.lee").unwrap();
        let mut result = lab_result();
        result.validation_status = ValidationStatus::RequiresReview;

        result
            .review(&reviewer, ReviewDecision::Approve, Some("checked".into()))
            .expect("first review");
        assert_eq!(result.validation_status, ValidationStatus::Validated);
        assert_eq!(result.reviewed_by.as_deref(), Some("dr.lee"));
        assert!(result.reviewed_at.is_some());

        let err = result
            .review(&reviewer, ReviewDecision::Reject, None)
            .expect_err("already final");
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: ValidationStatus::Validated,
                to: ValidationStatus::Rejected
            }
        ));
    }

    #[test]
    fn test_review_appends_comments() {
        let mut result = lab_result();
        result.validation_comments = Some("MIC: 0.25 µg/mL".into());
        result
            .review(
                &NonEmptyText::new("tech").unwrap(),
                ReviewDecision::Reject,
                Some("contaminated plate".into()),
            )
            .unwrap();
        assert_eq!(
            result.validation_comments.as_deref(),
            Some("MIC: 0.25 µg/mL; contaminated plate")
        );
    }

    #[test]
    fn test_no_rules_applied_yields_empty_ids() {
        assert!(lab_result().triggered_rule_ids().unwrap().is_empty());
    }
}
