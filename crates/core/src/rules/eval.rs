//! Evaluation of parsed conditions against a rule context.

use super::condition::{CompareOp, Condition, ConditionError, Field, Operand};
use super::model::RuleEvaluationContext;
use crate::breakpoints::{SensitivityResult, TestMethod};
use crate::constants::{RULE_CLEAR_MARGIN_FLOOR, RULE_CLEAR_MARGIN_FRACTION};

/// Outcome of evaluating a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub matched: bool,
    /// `false` when a measurement comparison that decided the outcome sat within the
    /// near-threshold margin.
    pub clear: bool,
}

impl Evaluation {
    fn exact(matched: bool) -> Self {
        Self {
            matched,
            clear: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value<'a> {
    Number(f64),
    Text(&'a str),
    Result(SensitivityResult),
    Method(TestMethod),
}

impl Value<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "a number",
            Value::Text(_) => "text",
            Value::Result(_) => "a susceptibility result",
            Value::Method(_) => "a test method",
        }
    }
}

/// Where operand values come from: a real context, or representative values per field for
/// checking a condition before any context exists.
#[derive(Clone, Copy)]
enum Source<'a> {
    Context(&'a RuleEvaluationContext),
    Placeholder,
}

impl<'a> Source<'a> {
    fn resolve(self, operand: &'a Operand) -> Value<'a> {
        match operand {
            Operand::Number(n) => Value::Number(*n),
            Operand::Text(s) => Value::Text(s),
            Operand::Field(field) => match self {
                Source::Context(ctx) => match field {
                    Field::TestValue => Value::Number(ctx.test_value),
                    Field::Year => Value::Number(f64::from(ctx.year)),
                    Field::MicroorganismId => Value::Text(ctx.microorganism_id.as_str()),
                    Field::DrugId => Value::Text(ctx.drug_id.as_str()),
                    Field::TestMethod => Value::Method(ctx.test_method),
                    Field::InterpretedResult => Value::Result(ctx.interpreted_result),
                },
                Source::Placeholder => match field {
                    Field::TestValue | Field::Year => Value::Number(0.0),
                    Field::MicroorganismId | Field::DrugId => Value::Text(""),
                    Field::TestMethod => Value::Method(TestMethod::Mic),
                    Field::InterpretedResult => Value::Result(SensitivityResult::Susceptible),
                },
            },
        }
    }
}

impl Condition {
    /// Evaluates the condition. `&&` and `||` short-circuit, and only comparisons whose
    /// outcome could flip the overall result count towards [`Evaluation::clear`].
    ///
    /// # Errors
    ///
    /// Returns `ConditionError::TypeMismatch` when a comparison mixes incompatible values.
    pub fn evaluate(&self, ctx: &RuleEvaluationContext) -> Result<Evaluation, ConditionError> {
        evaluate(self, Source::Context(ctx))
    }
}

/// Checks every comparison in `condition` for type errors, without short-circuiting.
pub(crate) fn type_check(condition: &Condition) -> Result<(), ConditionError> {
    match condition {
        Condition::Literal(_) => Ok(()),
        Condition::Compare { .. } | Condition::In { .. } => {
            evaluate(condition, Source::Placeholder).map(|_| ())
        }
        Condition::And(l, r) | Condition::Or(l, r) => {
            type_check(l)?;
            type_check(r)
        }
        Condition::Not(inner) => type_check(inner),
    }
}

fn evaluate(condition: &Condition, source: Source<'_>) -> Result<Evaluation, ConditionError> {
    match condition {
        Condition::Literal(b) => Ok(Evaluation::exact(*b)),
        Condition::Compare { left, op, right } => compare(left, *op, right, source),
        Condition::In { operand, options } => {
            let value = source.resolve(operand);
            let mut found = false;
            for option in options {
                if equals(value, source.resolve(option))? {
                    found = true;
                }
            }
            Ok(Evaluation::exact(found))
        }
        Condition::And(l, r) => {
            let left = evaluate(l, source)?;
            if !left.matched {
                return Ok(left);
            }
            let right = evaluate(r, source)?;
            Ok(Evaluation {
                matched: right.matched,
                clear: if right.matched {
                    left.clear && right.clear
                } else {
                    right.clear
                },
            })
        }
        Condition::Or(l, r) => {
            let left = evaluate(l, source)?;
            if left.matched {
                return Ok(left);
            }
            let right = evaluate(r, source)?;
            Ok(Evaluation {
                matched: right.matched,
                clear: if right.matched {
                    right.clear
                } else {
                    left.clear && right.clear
                },
            })
        }
        Condition::Not(inner) => evaluate(inner, source).map(|e| Evaluation {
            matched: !e.matched,
            clear: e.clear,
        }),
    }
}

fn compare(
    left: &Operand,
    op: CompareOp,
    right: &Operand,
    source: Source<'_>,
) -> Result<Evaluation, ConditionError> {
    let l = source.resolve(left);
    let r = source.resolve(right);

    if !op.is_ordering() {
        return equals(l, r).map(|eq| Evaluation::exact(eq == (op == CompareOp::Eq)));
    }
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(ConditionError::TypeMismatch(format!(
            "'{}' needs numbers, found {} and {}",
            op.symbol(),
            l.kind(),
            r.kind()
        )));
    };

    let matched = match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    };

    let measured = |o: &Operand| matches!(o, Operand::Field(Field::TestValue));
    let clear = match (measured(left), measured(right)) {
        (true, false) => clear_of(a, b),
        (false, true) => clear_of(b, a),
        _ => true,
    };

    Ok(Evaluation { matched, clear })
}

fn clear_of(value: f64, threshold: f64) -> bool {
    let margin = (value - threshold).abs();
    if threshold == 0.0 {
        margin >= RULE_CLEAR_MARGIN_FLOOR
    } else {
        margin >= threshold.abs() * RULE_CLEAR_MARGIN_FRACTION
    }
}

fn equals(l: Value<'_>, r: Value<'_>) -> Result<bool, ConditionError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::Text(a), Value::Text(b)) => Ok(a == b),
        (Value::Result(a), Value::Result(b)) => Ok(a == b),
        (Value::Method(a), Value::Method(b)) => Ok(a == b),
        (Value::Result(a), Value::Text(t)) | (Value::Text(t), Value::Result(a)) => t
            .parse::<SensitivityResult>()
            .map(|b| a == b)
            .map_err(ConditionError::TypeMismatch),
        (Value::Method(a), Value::Text(t)) | (Value::Text(t), Value::Method(a)) => t
            .parse::<TestMethod>()
            .map(|b| a == b)
            .map_err(ConditionError::TypeMismatch),
        _ => Err(ConditionError::TypeMismatch(format!(
            "cannot compare {} with {}",
            l.kind(),
            r.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::condition::parse_condition;
    use lims_types::{DrugId, MicroorganismId};

    fn ctx(value: f64, result: SensitivityResult) -> RuleEvaluationContext {
        RuleEvaluationContext {
            microorganism_id: MicroorganismId::parse("sau").unwrap(),
            drug_id: DrugId::parse("van").unwrap(),
            test_value: value,
            test_method: TestMethod::Mic,
            interpreted_result: result,
            year: 2024,
        }
    }

    fn eval(source: &str, context: &RuleEvaluationContext) -> Evaluation {
        parse_condition(source)
            .expect("condition should parse")
            .evaluate(context)
            .expect("condition should evaluate")
    }

    #[test]
    fn test_fields_and_case_insensitive_codes() {
        let c = ctx(2.0, SensitivityResult::Susceptible);
        assert!(eval("microorganismId == 'sau' && drugId != 'oxa'", &c).matched);
        assert!(eval("interpretedResult == 'susceptible'", &c).matched);
        assert!(eval("result == 's' && method == 'mic'", &c).matched);
        assert!(eval("year >= 2020 && year < 2025", &c).matched);
        assert!(!eval("microorganismId == 'SAU'", &c).matched);
    }

    #[test]
    fn test_in_list() {
        let c = ctx(2.0, SensitivityResult::Intermediate);
        assert!(eval("interpretedResult in ['S', 'I']", &c).matched);
        assert!(!eval("drugId in ['oxa', 'fox']", &c).matched);
        assert!(eval("testValue in [1, 2, 4]", &c).matched);
    }

    #[test]
    fn test_clear_and_near_threshold_comparisons() {
        let c = ctx(20.0, SensitivityResult::Resistant);
        let far = eval("testValue >= 16", &c);
        assert!(far.matched && far.clear);

        let near = eval("testValue >= 19", &c);
        assert!(near.matched && !near.clear);

        let reversed = eval("16 <= testValue", &c);
        assert!(reversed.matched && reversed.clear);

        let boundary = eval("testValue >= 20", &c);
        assert!(boundary.matched && !boundary.clear);
    }

    #[test]
    fn test_zero_threshold_uses_absolute_floor() {
        let c = ctx(0.5, SensitivityResult::Susceptible);
        assert!(!eval("testValue > 0", &c).clear);
        let c = ctx(1.5, SensitivityResult::Susceptible);
        assert!(eval("testValue > 0", &c).clear);
    }

    #[test]
    fn test_only_deciding_comparisons_affect_clearance() {
        let c = ctx(20.0, SensitivityResult::Resistant);

        let e = eval("testValue > 21 || year == 2024", &c);
        assert!(e.matched && e.clear);

        let e = eval("testValue > 21 || year == 1999", &c);
        assert!(!e.matched && !e.clear);

        let e = eval("year == 2024 || testValue >= 19.5", &c);
        assert!(e.matched && e.clear);

        let e = eval("year == 1999 && testValue >= 19.5", &c);
        assert!(!e.matched && e.clear);

        let e = eval("year == 2024 && testValue >= 19.5", &c);
        assert!(e.matched && !e.clear);
    }

    #[test]
    fn test_not_keeps_clearance() {
        let c = ctx(20.0, SensitivityResult::Resistant);
        let e = eval("!(testValue < 19.5)", &c);
        assert!(e.matched && !e.clear);
    }

    #[test]
    fn test_year_comparisons_are_exact() {
        let c = ctx(20.0, SensitivityResult::Resistant);
        let e = eval("year >= 2024", &c);
        assert!(e.matched && e.clear);
    }

    #[test]
    fn test_unchecked_type_error_surfaces_at_evaluation() {
        let condition = crate::rules::condition::parse("testMethod < 3").expect("parses");
        let err = condition
            .evaluate(&ctx(1.0, SensitivityResult::Susceptible))
            .expect_err("ordering on a method");
        assert!(matches!(err, ConditionError::TypeMismatch(_)));
    }
}
