//! Expert rule lifecycle operations.

use super::action::RuleAction;
use super::condition::parse_condition;
use super::model::{ExpertRule, NewExpertRule};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::Lifecycle;
use crate::repositories::ExpertRuleRepository;
use crate::validation::validate_year;
use chrono::Utc;
use lims_types::RuleId;
use std::sync::Arc;

/// Checks everything about a rule definition that can be checked without a test context.
fn validate_definition(rule: &NewExpertRule) -> CoreResult<()> {
    parse_condition(&rule.condition)?;
    RuleAction::parse(&rule.action)?;

    if rule.microorganism_id.is_none() && rule.drug_id.is_none() && rule.year.is_none() {
        return Err(CoreError::InvalidInput(
            "an expert rule must be scoped by microorganism, drug or year".into(),
        ));
    }
    if let Some(year) = rule.year {
        validate_year(year)?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct ExpertRuleService {
    repo: Arc<dyn ExpertRuleRepository>,
}

impl ExpertRuleService {
    pub fn new(repo: Arc<dyn ExpertRuleRepository>) -> Self {
        Self { repo }
    }

    /// Rules in insertion order. Retired rules are included only when asked for.
    pub fn list(&self, include_retired: bool) -> CoreResult<Vec<ExpertRule>> {
        Ok(self
            .repo
            .list()?
            .into_iter()
            .filter(|r| include_retired || r.is_active())
            .collect())
    }

    pub fn get(&self, id: &RuleId) -> CoreResult<Option<ExpertRule>> {
        self.repo.get(id)
    }

    /// Registers a new rule.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Condition` if the condition does not parse, `CoreError::InvalidAction`
    /// for a malformed directive and `CoreError::InvalidInput` for an unscoped rule or a year
    /// out of range.
    pub fn create(&self, new: NewExpertRule) -> CoreResult<ExpertRule> {
        validate_definition(&new)?;

        let now = Utc::now();
        let rule = ExpertRule {
            id: RuleId::parse(uuid::Uuid::new_v4().simple().to_string())?,
            name: new.name,
            description: new.description,
            rule_type: new.rule_type,
            condition: new.condition,
            action: new.action,
            priority: new.priority,
            year: new.year,
            microorganism_id: new.microorganism_id,
            drug_id: new.drug_id,
            source_reference: new.source_reference,
            notes: new.notes,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };

        self.repo.insert(rule.clone())?;
        tracing::info!(
            id = %rule.id,
            rule_type = %rule.rule_type,
            priority = rule.priority,
            "created expert rule"
        );
        Ok(rule)
    }

    /// Replaces the definition of an existing rule, keeping its id, lifecycle and creation time.
    pub fn update(&self, id: &RuleId, update: NewExpertRule) -> CoreResult<ExpertRule> {
        let existing = self.require(id)?;
        validate_definition(&update)?;

        let rule = ExpertRule {
            id: existing.id,
            name: update.name,
            description: update.description,
            rule_type: update.rule_type,
            condition: update.condition,
            action: update.action,
            priority: update.priority,
            year: update.year,
            microorganism_id: update.microorganism_id,
            drug_id: update.drug_id,
            source_reference: update.source_reference,
            notes: update.notes,
            lifecycle: existing.lifecycle,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };

        self.repo.update(rule.clone())?;
        Ok(rule)
    }

    /// Retires a rule. Retired rules are kept for audit but never evaluated.
    pub fn retire(&self, id: &RuleId) -> CoreResult<ExpertRule> {
        let mut rule = self.require(id)?;
        if rule.lifecycle == Lifecycle::Retired {
            return Ok(rule);
        }

        rule.lifecycle = Lifecycle::Retired;
        rule.updated_at = Utc::now();
        self.repo.update(rule.clone())?;
        tracing::info!(id = %rule.id, "retired expert rule");
        Ok(rule)
    }

    fn require(&self, id: &RuleId) -> CoreResult<ExpertRule> {
        self.repo.get(id)?.ok_or_else(|| CoreError::NotFound {
            kind: "expert rule",
            id: id.to_string(),
        })
    }
}
