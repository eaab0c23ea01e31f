//! Expert rules: records, the condition language, action directives and the evaluator.

pub mod action;
pub mod condition;
pub mod eval;
pub mod evaluator;
pub mod lexer;
pub mod model;
pub mod service;

pub use action::{ActionError, RuleAction};
pub use condition::{parse_condition, CompareOp, Condition, ConditionError, Field, Operand};
pub use eval::Evaluation;
pub use evaluator::{
    evaluate_rules, select_applicable, OverridePolicy, RuleEvaluationResult, RuleEvaluator,
    ValidationIssue, ValidationResult,
};
pub use model::{ExpertRule, NewExpertRule, RuleEvaluationContext, RuleType};
pub use service::ExpertRuleService;
