//! Interpretation and validation of one measurement.
//!
//! The pipeline resolves the applicable breakpoint standard, interprets the measurement, runs
//! the expert rules over the interpreted result and merges everything into an
//! [`InterpretationResult`]. Nothing is persisted here; [`InterpretationService::interpret_lab_result`]
//! only mutates the [`LabResult`] it is given.

use crate::breakpoints::{interpret, BreakpointService, Confidence, SensitivityResult, TestMethod};
use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::lab_result::{LabResult, ValidationStatus};
use crate::repositories::{BreakpointStandardRepository, ExpertRuleRepository};
use crate::rules::{RuleEvaluationContext, RuleEvaluator, ValidationResult};
use lims_types::{DrugId, MicroorganismId, StandardId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InterpretationRequest {
    pub microorganism_id: MicroorganismId,
    pub drug_id: DrugId,
    pub test_method: TestMethod,
    pub test_value: f64,
    /// Interpret against this guideline year instead of the latest.
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InterpretationResult {
    pub standard_id: StandardId,
    /// Human-readable reference of the standard used.
    pub breakpoint_used: String,
    pub standard_year: i32,
    pub method: TestMethod,
    pub test_value: f64,
    /// Breakpoint-derived result before any rule was applied.
    pub raw_result: SensitivityResult,
    pub final_result: SensitivityResult,
    pub confidence: Confidence,
    pub margin: Option<f64>,
    pub validation: ValidationResult,
    /// Standard notes, the measurement description and rule advisories, in that order.
    pub notes: Vec<String>,
    /// `notes` joined for storage on a lab result.
    pub comments: String,
    pub status_hint: ValidationStatus,
}

/// Suggested validation status for an interpreted result.
///
/// Any error or review demand requires review. Otherwise a high-confidence result is validated
/// when auto-validation is enabled and left pending when it is not.
pub fn status_hint(
    validation: &ValidationResult,
    confidence: Confidence,
    auto_validate: bool,
) -> ValidationStatus {
    if !validation.is_valid || validation.requires_review {
        ValidationStatus::RequiresReview
    } else if auto_validate && confidence == Confidence::High {
        ValidationStatus::Validated
    } else {
        ValidationStatus::Pending
    }
}

#[derive(Clone)]
pub struct InterpretationService {
    cfg: Arc<CoreConfig>,
    breakpoints: BreakpointService,
    evaluator: RuleEvaluator,
}

impl InterpretationService {
    pub fn new(
        cfg: Arc<CoreConfig>,
        breakpoints: Arc<dyn BreakpointStandardRepository>,
        rules: Arc<dyn ExpertRuleRepository>,
    ) -> Self {
        let evaluator = RuleEvaluator::new(rules, cfg.override_policy().clone());
        Self {
            cfg,
            breakpoints: BreakpointService::new(breakpoints),
            evaluator,
        }
    }

    pub fn breakpoints(&self) -> &BreakpointService {
        &self.breakpoints
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// Interprets and validates a measurement.
    ///
    /// Returns `Ok(None)` when no active standard applies.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Interpret` for an unusable measurement or an incomplete standard,
    /// and propagates repository failures.
    pub fn interpret_and_validate(
        &self,
        request: &InterpretationRequest,
    ) -> CoreResult<Option<InterpretationResult>> {
        let Some(standard) = self.breakpoints.resolve(
            &request.microorganism_id,
            &request.drug_id,
            request.test_method,
            request.year,
        )?
        else {
            tracing::debug!(
                microorganism = %request.microorganism_id,
                drug = %request.drug_id,
                method = %request.test_method,
                year = ?request.year,
                "no applicable breakpoint standard"
            );
            return Ok(None);
        };

        let interpretation = interpret(&standard, request.test_value)?;

        let context = RuleEvaluationContext {
            microorganism_id: request.microorganism_id.clone(),
            drug_id: request.drug_id.clone(),
            test_value: request.test_value,
            test_method: request.test_method,
            interpreted_result: interpretation.result,
            year: standard.year,
        };
        let validation = self.evaluator.validate_result(&context)?;

        let confidence = validation
            .override_confidence()
            .unwrap_or(interpretation.confidence);

        let mut notes: Vec<String> = standard
            .notes
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        notes.push(interpretation.description.clone());
        notes.extend(validation.notes.iter().cloned());
        let comments = notes.join("; ");

        let status_hint = status_hint(&validation, confidence, self.cfg.auto_validate());

        Ok(Some(InterpretationResult {
            standard_id: standard.id.clone(),
            breakpoint_used: standard.reference(),
            standard_year: standard.year,
            method: standard.method,
            test_value: request.test_value,
            raw_result: interpretation.result,
            final_result: validation.final_result,
            confidence,
            margin: interpretation.margin,
            validation,
            notes,
            comments,
            status_hint,
        }))
    }

    /// Interprets a lab result and writes the outcome back onto it.
    ///
    /// Returns `Ok(None)`, leaving the lab result untouched, when no standard applies.
    pub fn interpret_lab_result(
        &self,
        lab_result: &mut LabResult,
    ) -> CoreResult<Option<InterpretationResult>> {
        let request = InterpretationRequest {
            microorganism_id: lab_result.microorganism_id.clone(),
            drug_id: lab_result.drug_id.clone(),
            test_method: lab_result.test_method,
            test_value: lab_result.raw_result,
            year: lab_result.test_year,
        };

        let Some(outcome) = self.interpret_and_validate(&request)? else {
            return Ok(None);
        };
        lab_result.apply_interpretation(&outcome)?;
        tracing::info!(
            lab_result = %lab_result.id,
            result = %outcome.final_result,
            status = %outcome.status_hint,
            "interpreted lab result"
        );
        Ok(Some(outcome))
    }
}
