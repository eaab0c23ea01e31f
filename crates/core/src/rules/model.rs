//! Expert rule records and the context they are evaluated against.

use super::condition::{parse_condition, Condition, ConditionError};
use crate::breakpoints::{SensitivityResult, TestMethod};
use crate::lifecycle::Lifecycle;
use chrono::{DateTime, Utc};
use lims_types::{DrugId, MicroorganismId, NonEmptyText, RuleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Category of an expert rule. Determines how a triggered rule affects the final result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// The organism is resistant to the drug regardless of the measurement.
    IntrinsicResistance,
    /// An unusual phenotype that must be confirmed before release.
    ExceptionalPhenotype,
    /// The measurement falls outside what quality control allows.
    QualityControl,
    /// A comment to append to the report.
    InterpretiveComment,
    /// Cascade or suppression guidance for what to report.
    SelectiveReporting,
}

impl RuleType {
    pub const ALL: [RuleType; 5] = [
        RuleType::IntrinsicResistance,
        RuleType::ExceptionalPhenotype,
        RuleType::QualityControl,
        RuleType::InterpretiveComment,
        RuleType::SelectiveReporting,
    ];

    pub fn code(self) -> &'static str {
        match self {
            RuleType::IntrinsicResistance => "INTRINSIC_RESISTANCE",
            RuleType::ExceptionalPhenotype => "EXCEPTIONAL_PHENOTYPE",
            RuleType::QualityControl => "QUALITY_CONTROL",
            RuleType::InterpretiveComment => "INTERPRETIVE_COMMENT",
            RuleType::SelectiveReporting => "SELECTIVE_REPORTING",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        RuleType::ALL
            .into_iter()
            .find(|t| t.code() == wanted)
            .ok_or_else(|| format!("'{}' is not a rule type", s.trim()))
    }
}

/// A prioritised conditional policy over a test context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExpertRule {
    pub id: RuleId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: Option<String>,
    pub rule_type: RuleType,
    /// Condition source, e.g. `testValue >= 22 && interpretedResult == 'S'`.
    pub condition: String,
    /// Advisory text; may embed `OVERRIDE:<RESULT>` and `REVIEW` directives.
    pub action: String,
    /// Higher priorities are evaluated first and carry more authority.
    pub priority: i32,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub microorganism_id: Option<MicroorganismId>,
    #[serde(default)]
    pub drug_id: Option<DrugId>,
    #[serde(default)]
    pub source_reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpertRule {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Parses the condition source into an evaluable expression.
    pub fn compile(&self) -> Result<Condition, ConditionError> {
        parse_condition(&self.condition)
    }

    /// Whether this rule is a candidate for `context`: active, within its organism/drug scope
    /// and either unrestricted by year or restricted to the context's year.
    pub fn applies_to(&self, context: &RuleEvaluationContext) -> bool {
        self.is_active()
            && self
                .microorganism_id
                .as_ref()
                .map_or(true, |m| m == &context.microorganism_id)
            && self.drug_id.as_ref().map_or(true, |d| d == &context.drug_id)
            && self.year.map_or(true, |y| y == context.year)
    }
}

/// Fields supplied when creating an expert rule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewExpertRule {
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub condition: String,
    pub action: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub microorganism_id: Option<MicroorganismId>,
    #[serde(default)]
    pub drug_id: Option<DrugId>,
    #[serde(default)]
    pub source_reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The measurement an expert rule is evaluated against. Ephemeral, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RuleEvaluationContext {
    pub microorganism_id: MicroorganismId,
    pub drug_id: DrugId,
    pub test_value: f64,
    pub test_method: TestMethod,
    /// Breakpoint-derived result before any rule is applied.
    pub interpreted_result: SensitivityResult,
    pub year: i32,
}
