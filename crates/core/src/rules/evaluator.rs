//! The expert rule evaluator.
//!
//! Given a [`RuleEvaluationContext`], the evaluator gathers candidate rules from the
//! repository, keeps the active rules in scope, evaluates them in descending priority and
//! folds the triggered ones into a [`ValidationResult`].
//!
//! A rule whose condition or action cannot be evaluated never aborts the batch: it is recorded
//! as an errored, untriggered result and reported in `errors`.

use super::action::RuleAction;
use super::model::{ExpertRule, RuleEvaluationContext, RuleType};
use crate::breakpoints::{Confidence, SensitivityResult};
use crate::error::CoreResult;
use crate::repositories::ExpertRuleRepository;
use lims_types::RuleId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use utoipa::ToSchema;

/// Rule types whose triggering forces the final result.
///
/// Intrinsic resistance is always part of the policy and always wins over other overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePolicy {
    types: BTreeSet<RuleType>,
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self::new([])
    }
}

impl OverridePolicy {
    pub fn new(types: impl IntoIterator<Item = RuleType>) -> Self {
        let mut types: BTreeSet<RuleType> = types.into_iter().collect();
        types.insert(RuleType::IntrinsicResistance);
        Self { types }
    }

    pub fn forces_override(&self, rule_type: RuleType) -> bool {
        self.types.contains(&rule_type)
    }

    pub fn types(&self) -> impl Iterator<Item = RuleType> + '_ {
        self.types.iter().copied()
    }
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RuleEvaluationResult {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub priority: i32,
    pub triggered: bool,
    /// Rule-match certainty; unrelated to breakpoint-margin confidence.
    pub confidence: Confidence,
    pub action: String,
    /// Set when the rule could not be evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationIssue {
    /// The rule the issue belongs to, if any.
    pub rule_id: Option<RuleId>,
    pub message: String,
}

/// Aggregated outcome of running the applicable rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationResult {
    /// `true` when `errors` is empty. Triggering rules does not make a result invalid.
    pub is_valid: bool,
    /// Triggered rules, highest priority first.
    pub triggered_rules: Vec<RuleEvaluationResult>,
    /// Every evaluated rule, highest priority first.
    pub evaluations: Vec<RuleEvaluationResult>,
    pub final_result: SensitivityResult,
    /// The rule whose override produced `final_result`, if any.
    pub overridden_by: Option<RuleId>,
    pub requires_review: bool,
    pub quality_control_passed: bool,
    pub notes: Vec<String>,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Match confidence of the overriding rule, if a rule changed the result.
    pub fn override_confidence(&self) -> Option<Confidence> {
        let id = self.overridden_by.as_ref()?;
        self.triggered_rules
            .iter()
            .find(|r| &r.rule_id == id)
            .map(|r| r.confidence)
    }

    pub fn triggered_rule_ids(&self) -> Vec<RuleId> {
        self.triggered_rules
            .iter()
            .map(|r| r.rule_id.clone())
            .collect()
    }
}

/// Deduplicates candidates by id (first occurrence wins), keeps the active rules in scope for
/// `context` and orders them by descending priority.
///
/// Equal priorities fall back to insertion order (creation time, then id), whichever lookup
/// returned the rule.
pub fn select_applicable(
    candidates: impl IntoIterator<Item = ExpertRule>,
    context: &RuleEvaluationContext,
) -> Vec<ExpertRule> {
    let mut seen: HashSet<RuleId> = HashSet::new();
    let mut rules: Vec<ExpertRule> = candidates
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .filter(|r| r.applies_to(context))
        .collect();
    rules.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    rules
}

/// Evaluates `rules` in the order given and aggregates the outcome.
pub fn evaluate_rules(
    rules: &[ExpertRule],
    context: &RuleEvaluationContext,
    policy: &OverridePolicy,
) -> ValidationResult {
    let mut evaluations = Vec::with_capacity(rules.len());
    let mut notes = Vec::new();
    let mut errors = Vec::new();
    let mut requires_review = false;
    let mut quality_control_passed = true;
    let mut intrinsic: Option<RuleId> = None;
    // Highest-priority non-intrinsic override: (rule id, target).
    let mut explicit: Option<(RuleId, SensitivityResult)> = None;

    for rule in rules {
        let outcome = rule
            .compile()
            .map_err(|e| format!("invalid condition: {e}"))
            .and_then(|condition| {
                condition
                    .evaluate(context)
                    .map_err(|e| format!("condition failed: {e}"))
            })
            .and_then(|evaluation| {
                RuleAction::parse(&rule.action)
                    .map(|action| (evaluation, action))
                    .map_err(|e| format!("invalid action: {e}"))
            });

        let (evaluation, action) = match outcome {
            Ok(ok) => ok,
            Err(message) => {
                tracing::warn!(rule = %rule.id, "expert rule could not be evaluated: {}", message);
                errors.push(ValidationIssue {
                    rule_id: Some(rule.id.clone()),
                    message: format!("rule '{}' could not be evaluated: {message}", rule.name),
                });
                evaluations.push(result_for(rule, false, Confidence::Low, Some(message)));
                continue;
            }
        };

        let confidence = if evaluation.matched && evaluation.clear {
            Confidence::High
        } else {
            Confidence::Low
        };
        evaluations.push(result_for(rule, evaluation.matched, confidence, None));
        tracing::debug!(
            rule = %rule.id,
            priority = rule.priority,
            triggered = evaluation.matched,
            "evaluated expert rule"
        );
        if !evaluation.matched {
            continue;
        }

        let advisory = format!("{}: {}", rule.name, rule.action.trim());
        match rule.rule_type {
            RuleType::QualityControl => {
                quality_control_passed = false;
                errors.push(ValidationIssue {
                    rule_id: Some(rule.id.clone()),
                    message: format!("Quality control failed ({advisory})"),
                });
            }
            RuleType::ExceptionalPhenotype => {
                requires_review = true;
                notes.push(advisory);
            }
            RuleType::IntrinsicResistance
            | RuleType::InterpretiveComment
            | RuleType::SelectiveReporting => notes.push(advisory),
        }
        requires_review |= action.requires_review;

        if rule.rule_type == RuleType::IntrinsicResistance {
            intrinsic.get_or_insert_with(|| rule.id.clone());
            continue;
        }
        let target = if policy.forces_override(rule.rule_type) {
            Some(action.override_to.unwrap_or(SensitivityResult::Resistant))
        } else {
            action.override_to
        };
        if let Some(target) = target {
            if explicit.is_none() {
                explicit = Some((rule.id.clone(), target));
            } else {
                tracing::debug!(rule = %rule.id, "override superseded by an earlier rule");
            }
        }
    }

    let (final_result, overridden_by) = match (intrinsic, explicit) {
        (Some(id), _) => (SensitivityResult::Resistant, Some(id)),
        (None, Some((id, target))) => (target, Some(id)),
        (None, None) => (context.interpreted_result, None),
    };

    let triggered_rules: Vec<RuleEvaluationResult> =
        evaluations.iter().filter(|r| r.triggered).cloned().collect();

    ValidationResult {
        is_valid: errors.is_empty(),
        triggered_rules,
        evaluations,
        final_result,
        overridden_by,
        requires_review,
        quality_control_passed,
        notes,
        errors,
    }
}

fn result_for(
    rule: &ExpertRule,
    triggered: bool,
    confidence: Confidence,
    error: Option<String>,
) -> RuleEvaluationResult {
    RuleEvaluationResult {
        rule_id: rule.id.clone(),
        rule_name: rule.name.to_string(),
        rule_type: rule.rule_type,
        priority: rule.priority,
        triggered,
        confidence,
        action: rule.action.clone(),
        error,
    }
}

/// Runs the applicable expert rules for a context.
#[derive(Clone)]
pub struct RuleEvaluator {
    rules: Arc<dyn ExpertRuleRepository>,
    policy: OverridePolicy,
}

impl RuleEvaluator {
    pub fn new(rules: Arc<dyn ExpertRuleRepository>, policy: OverridePolicy) -> Self {
        Self { rules, policy }
    }

    /// Candidate rules from the four repository lookups, filtered and ordered for evaluation.
    pub fn applicable_rules(&self, context: &RuleEvaluationContext) -> CoreResult<Vec<ExpertRule>> {
        let mut candidates = self
            .rules
            .find_by_microorganism_and_drug(&context.microorganism_id, &context.drug_id)?;
        candidates.extend(self.rules.find_by_microorganism(&context.microorganism_id)?);
        candidates.extend(self.rules.find_by_drug(&context.drug_id)?);
        candidates.extend(self.rules.find_by_year(context.year)?);

        let rules = select_applicable(candidates, context);
        tracing::debug!(
            microorganism = %context.microorganism_id,
            drug = %context.drug_id,
            year = context.year,
            applicable = rules.len(),
            "selected expert rules"
        );
        Ok(rules)
    }

    /// Evaluates the applicable rules against `context`.
    ///
    /// # Errors
    ///
    /// Only repository failures are returned as errors. Rule-level failures are reported inside
    /// the [`ValidationResult`].
    pub fn validate_result(&self, context: &RuleEvaluationContext) -> CoreResult<ValidationResult> {
        let rules = self.applicable_rules(context)?;
        Ok(evaluate_rules(&rules, context, &self.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::TestMethod;
    use crate::lifecycle::Lifecycle;
    use crate::repositories::MemoryTable;
    use chrono::Utc;
    use lims_types::{DrugId, MicroorganismId, NonEmptyText};

    fn context(result: SensitivityResult) -> RuleEvaluationContext {
        RuleEvaluationContext {
            microorganism_id: MicroorganismId::parse("kpn").unwrap(),
            drug_id: DrugId::parse("amp").unwrap(),
            test_value: 25.0,
            test_method: TestMethod::DiskDiffusion,
            interpreted_result: result,
            year: 2024,
        }
    }

    fn rule(id: &str, rule_type: RuleType, condition: &str, priority: i32) -> ExpertRule {
        let now = Utc::now();
        ExpertRule {
            id: RuleId::parse(id).unwrap(),
            name: NonEmptyText::new(format!("rule {id}")).unwrap(),
            description: None,
            rule_type,
            condition: condition.into(),
            action: "Report per local policy".into(),
            priority,
            year: None,
            microorganism_id: Some(MicroorganismId::parse("kpn").unwrap()),
            drug_id: None,
            source_reference: None,
            notes: None,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn evaluator(rules: Vec<ExpertRule>, policy: OverridePolicy) -> RuleEvaluator {
        let table = MemoryTable::with_records(rules).expect("unique ids");
        RuleEvaluator::new(Arc::new(table), policy)
    }

    #[test]
    fn test_intrinsic_resistance_forces_resistant() {
        let eval = evaluator(
            vec![rule(
                "kpn-amp",
                RuleType::IntrinsicResistance,
                "drugId == 'amp'",
                100,
            )],
            OverridePolicy::default(),
        );

        let result = eval
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        assert_eq!(result.final_result, SensitivityResult::Resistant);
        assert_eq!(result.overridden_by, Some(RuleId::parse("kpn-amp").unwrap()));
        assert!(result.is_valid);
        assert_eq!(result.triggered_rules.len(), 1);
        assert_eq!(result.triggered_rules[0].confidence, Confidence::High);
    }

    #[test]
    fn test_retired_rule_never_triggers() {
        let mut retired = rule("old", RuleType::IntrinsicResistance, "true", 100);
        retired.lifecycle = Lifecycle::Retired;
        let eval = evaluator(vec![retired], OverridePolicy::default());

        let result = eval
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        assert!(result.triggered_rules.is_empty());
        assert!(result.evaluations.is_empty());
        assert_eq!(result.final_result, SensitivityResult::Susceptible);
    }

    #[test]
    fn test_triggered_rules_are_in_descending_priority() {
        let eval = evaluator(
            vec![
                rule("low", RuleType::InterpretiveComment, "true", 5),
                rule("high", RuleType::InterpretiveComment, "true", 10),
                rule("mid-silent", RuleType::InterpretiveComment, "false", 7),
            ],
            OverridePolicy::default(),
        );

        let result = eval
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        let triggered: Vec<&str> = result
            .triggered_rules
            .iter()
            .map(|r| r.rule_id.as_str())
            .collect();
        assert_eq!(triggered, vec!["high", "low"]);
        assert_eq!(result.evaluations.len(), 3);
        assert_eq!(result.notes.len(), 2);
    }

    #[test]
    fn test_malformed_condition_is_isolated() {
        let eval = evaluator(
            vec![
                rule("broken", RuleType::InterpretiveComment, "testValue >>= 3", 50),
                rule("fine", RuleType::InterpretiveComment, "testValue > 10", 10),
            ],
            OverridePolicy::default(),
        );

        let result = eval
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].rule_id,
            Some(RuleId::parse("broken").unwrap())
        );

        let broken = &result.evaluations[0];
        assert!(!broken.triggered);
        assert!(broken.error.is_some());

        assert_eq!(result.triggered_rules.len(), 1);
        assert_eq!(result.triggered_rules[0].rule_id.as_str(), "fine");
    }

    #[test]
    fn test_advisory_types_do_not_override_without_directive() {
        let eval = evaluator(
            vec![
                rule("pheno", RuleType::ExceptionalPhenotype, "true", 20),
                rule("qc", RuleType::QualityControl, "testValue > 40", 10),
            ],
            OverridePolicy::default(),
        );

        let result = eval
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        assert_eq!(result.final_result, SensitivityResult::Susceptible);
        assert!(result.overridden_by.is_none());
        assert!(result.requires_review);
        assert!(result.is_valid);
        assert!(result.quality_control_passed);
    }

    #[test]
    fn test_quality_control_failure_invalidates() {
        let eval = evaluator(
            vec![rule("qc", RuleType::QualityControl, "testValue > 20", 10)],
            OverridePolicy::default(),
        );

        let result = eval
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        assert!(!result.is_valid);
        assert!(!result.quality_control_passed);
        assert!(result.errors[0].message.starts_with("Quality control failed"));
    }

    #[test]
    fn test_policy_and_explicit_overrides() {
        let mut explicit = rule("explicit", RuleType::InterpretiveComment, "true", 30);
        explicit.action = "OVERRIDE:INTERMEDIATE".into();
        let pheno = rule("pheno", RuleType::ExceptionalPhenotype, "true", 40);

        let default_policy = evaluator(
            vec![explicit.clone(), pheno.clone()],
            OverridePolicy::default(),
        )
        .validate_result(&context(SensitivityResult::Susceptible))
        .unwrap();
        assert_eq!(default_policy.final_result, SensitivityResult::Intermediate);
        assert_eq!(default_policy.overridden_by.unwrap().as_str(), "explicit");

        let widened = evaluator(
            vec![explicit, pheno],
            OverridePolicy::new([RuleType::ExceptionalPhenotype]),
        )
        .validate_result(&context(SensitivityResult::Susceptible))
        .unwrap();
        assert_eq!(widened.final_result, SensitivityResult::Resistant);
        assert_eq!(widened.overridden_by.unwrap().as_str(), "pheno");
    }

    #[test]
    fn test_intrinsic_resistance_wins_over_higher_priority_override() {
        let mut susceptible = rule("force-s", RuleType::InterpretiveComment, "true", 90);
        susceptible.action = "OVERRIDE:S".into();
        let intrinsic = rule("intrinsic", RuleType::IntrinsicResistance, "true", 1);

        let result = evaluator(vec![susceptible, intrinsic], OverridePolicy::default())
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        assert_eq!(result.final_result, SensitivityResult::Resistant);
        assert_eq!(result.overridden_by.unwrap().as_str(), "intrinsic");
    }

    #[test]
    fn test_select_applicable_dedups_and_filters_scope() {
        let ctx = context(SensitivityResult::Susceptible);
        let mut other_year = rule("y2019", RuleType::InterpretiveComment, "true", 1);
        other_year.year = Some(2019);
        let mut other_drug = rule("oxa", RuleType::InterpretiveComment, "true", 1);
        other_drug.drug_id = Some(DrugId::parse("oxa").unwrap());
        let a = rule("a", RuleType::InterpretiveComment, "true", 1);

        let selected = select_applicable(
            vec![a.clone(), other_year, a.clone(), other_drug, a],
            &ctx,
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.as_str(), "a");
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order_across_lookups() {
        let created = Utc::now();
        let mut drug_only = rule("a-first", RuleType::InterpretiveComment, "true", 5);
        drug_only.microorganism_id = None;
        drug_only.drug_id = Some(DrugId::parse("amp").unwrap());
        drug_only.action = "OVERRIDE:I".into();
        drug_only.created_at = created;

        let mut scoped = rule("b-second", RuleType::InterpretiveComment, "true", 5);
        scoped.drug_id = Some(DrugId::parse("amp").unwrap());
        scoped.action = "OVERRIDE:S".into();
        scoped.created_at = created + chrono::Duration::seconds(1);

        let result = evaluator(vec![drug_only, scoped], OverridePolicy::default())
            .validate_result(&context(SensitivityResult::Resistant))
            .unwrap();
        let triggered: Vec<&str> = result
            .triggered_rules
            .iter()
            .map(|r| r.rule_id.as_str())
            .collect();
        assert_eq!(triggered, vec!["a-first", "b-second"]);
        assert_eq!(result.final_result, SensitivityResult::Intermediate);
        assert_eq!(result.overridden_by.unwrap().as_str(), "a-first");
    }

    #[test]
    fn test_equal_priority_and_creation_time_order_by_id() {
        let ctx = context(SensitivityResult::Susceptible);
        let created = Utc::now();
        let mut later_id = rule("zeta", RuleType::InterpretiveComment, "true", 3);
        later_id.created_at = created;
        let mut earlier_id = rule("alpha", RuleType::InterpretiveComment, "true", 3);
        earlier_id.created_at = created;

        let selected = select_applicable(vec![later_id, earlier_id], &ctx);
        let ids: Vec<&str> = selected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_near_threshold_match_is_low_confidence() {
        let eval = evaluator(
            vec![rule("near", RuleType::InterpretiveComment, "testValue >= 24", 1)],
            OverridePolicy::default(),
        );
        let result = eval
            .validate_result(&context(SensitivityResult::Susceptible))
            .unwrap();
        assert_eq!(result.triggered_rules[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_policy_always_contains_intrinsic_resistance() {
        let policy = OverridePolicy::new([RuleType::QualityControl]);
        assert!(policy.forces_override(RuleType::IntrinsicResistance));
        assert!(policy.forces_override(RuleType::QualityControl));
        assert!(!policy.forces_override(RuleType::ExceptionalPhenotype));
    }
}
