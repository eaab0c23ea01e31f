//! Typed condition expressions and their parser.
//!
//! Rule conditions are parsed once into a [`Condition`] tree and evaluated by walking the
//! tree against a [`RuleEvaluationContext`](super::RuleEvaluationContext). Nothing is ever
//! executed as code.

use super::eval::type_check;
use super::lexer::{tokenize, Spanned, Token};
use crate::breakpoints::model::format_number;
use crate::constants::{MAX_CONDITION_DEPTH, MAX_CONDITION_LEN};
use std::fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,
    #[error("condition is longer than {max} characters")]
    TooLong { max: usize },
    #[error("unrecognised character at offset {offset}")]
    Lex { offset: usize },
    #[error("expected {expected} at offset {offset}, found {found}")]
    Unexpected {
        found: String,
        offset: usize,
        expected: &'static str,
    },
    #[error("expected {expected} but the condition ended")]
    UnexpectedEnd { expected: &'static str },
    #[error("unknown field '{name}' at offset {offset}")]
    UnknownField { name: String, offset: usize },
    #[error("condition nests deeper than {max} levels")]
    TooDeep { max: usize },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

/// A context field a condition can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TestValue,
    MicroorganismId,
    DrugId,
    TestMethod,
    InterpretedResult,
    Year,
}

impl Field {
    /// Resolves a field name. Accepts camelCase, snake_case, a few short aliases and an
    /// optional `context.` prefix.
    pub fn from_name(name: &str) -> Option<Field> {
        let name = name.strip_prefix("context.").unwrap_or(name);
        match name {
            "testValue" | "test_value" | "value" => Some(Field::TestValue),
            "microorganismId" | "microorganism_id" | "microorganism" => {
                Some(Field::MicroorganismId)
            }
            "drugId" | "drug_id" | "drug" => Some(Field::DrugId),
            "testMethod" | "test_method" | "method" => Some(Field::TestMethod),
            "interpretedResult" | "interpreted_result" | "result" => {
                Some(Field::InterpretedResult)
            }
            "year" => Some(Field::Year),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::TestValue => "testValue",
            Field::MicroorganismId => "microorganismId",
            Field::DrugId => "drugId",
            Field::TestMethod => "testMethod",
            Field::InterpretedResult => "interpretedResult",
            Field::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(Field),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// A parsed rule condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(bool),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        operand: Operand,
        options: Vec<Operand>,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field(field) => f.write_str(field.name()),
            Operand::Number(n) => f.write_str(&format_number(*n)),
            Operand::Text(s) if s.contains('\'') => write!(f, "\"{s}\""),
            Operand::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(b) => write!(f, "{b}"),
            Condition::Compare { left, op, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Condition::In { operand, options } => {
                write!(f, "{operand} in [")?;
                for (i, option) in options.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{option}")?;
                }
                f.write_str("]")
            }
            Condition::And(l, r) => write!(f, "({l} && {r})"),
            Condition::Or(l, r) => write!(f, "({l} || {r})"),
            Condition::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

/// Parses and type-checks a condition.
///
/// # Errors
///
/// Returns a [`ConditionError`] describing the first problem found. Type errors that can be
/// detected without a context, such as `interpretedResult == 'X'` or `drugId > 3`, are
/// reported here rather than at evaluation time.
pub fn parse_condition(source: &str) -> Result<Condition, ConditionError> {
    let condition = parse(source)?;
    type_check(&condition)?;
    Ok(condition)
}

/// Parses a condition without type-checking it.
pub fn parse(source: &str) -> Result<Condition, ConditionError> {
    if source.len() > MAX_CONDITION_LEN {
        return Err(ConditionError::TooLong {
            max: MAX_CONDITION_LEN,
        });
    }
    if source.trim().is_empty() {
        return Err(ConditionError::Empty);
    }

    let tokens = tokenize(source).map_err(|offset| ConditionError::Lex { offset })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let condition = parser.expr()?;
    match parser.peek() {
        None => Ok(condition),
        Some(extra) => Err(ConditionError::Unexpected {
            found: extra.token.to_string(),
            offset: extra.offset,
            expected: "end of condition",
        }),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> Result<Spanned, ConditionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().is_some_and(|s| &s.token == token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ConditionError> {
        let next = self.next(expected)?;
        if next.token == token {
            Ok(())
        } else {
            Err(unexpected(next, expected))
        }
    }

    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_CONDITION_DEPTH {
            return Err(ConditionError::TooDeep {
                max: MAX_CONDITION_DEPTH,
            });
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Condition, ConditionError> {
        self.descend()?;
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        self.depth -= 1;
        Ok(left)
    }

    fn and(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.unary()?;
        while self.eat(&Token::And) {
            let right = self.unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Condition, ConditionError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Condition, ConditionError> {
        const EXPECTED: &str = "a comparison, 'true', 'false' or '('";

        let Some(head) = self.peek().cloned() else {
            return Err(ConditionError::UnexpectedEnd { expected: EXPECTED });
        };
        match head.token {
            Token::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::True => {
                self.pos += 1;
                Ok(Condition::Literal(true))
            }
            Token::False => {
                self.pos += 1;
                Ok(Condition::Literal(false))
            }
            Token::Ident(_) | Token::Number(_) | Token::Text(_) => self.comparison(),
            _ => Err(unexpected(head, EXPECTED)),
        }
    }

    fn comparison(&mut self) -> Result<Condition, ConditionError> {
        let left_offset = self.peek().map_or(0, |s| s.offset);
        let left = self.operand()?;

        let op = match self.peek().map(|s| &s.token) {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(Token::In) => {
                self.pos += 1;
                let options = self.list()?;
                return Ok(Condition::In {
                    operand: left,
                    options,
                });
            }
            _ => {
                return Err(ConditionError::TypeMismatch(format!(
                    "'{left}' at offset {left_offset} is not a boolean expression"
                )))
            }
        };
        self.pos += 1;
        let right = self.operand()?;
        Ok(Condition::Compare { left, op, right })
    }

    fn list(&mut self) -> Result<Vec<Operand>, ConditionError> {
        self.expect(Token::LBracket, "'['")?;
        let mut options = vec![self.literal()?];
        while self.eat(&Token::Comma) {
            options.push(self.literal()?);
        }
        self.expect(Token::RBracket, "']' or ','")?;
        Ok(options)
    }

    fn literal(&mut self) -> Result<Operand, ConditionError> {
        const EXPECTED: &str = "a number or string";
        let next = self.next(EXPECTED)?;
        match next.token {
            Token::Number(n) => Ok(Operand::Number(n)),
            Token::Text(s) => Ok(Operand::Text(s)),
            _ => Err(unexpected(next, EXPECTED)),
        }
    }

    fn operand(&mut self) -> Result<Operand, ConditionError> {
        const EXPECTED: &str = "a field, number or string";
        let next = self.next(EXPECTED)?;
        match next.token {
            Token::Number(n) => Ok(Operand::Number(n)),
            Token::Text(s) => Ok(Operand::Text(s)),
            Token::Ident(name) => {
                Field::from_name(&name)
                    .map(Operand::Field)
                    .ok_or(ConditionError::UnknownField {
                        name,
                        offset: next.offset,
                    })
            }
            _ => Err(unexpected(next, EXPECTED)),
        }
    }
}

fn unexpected(found: Spanned, expected: &'static str) -> ConditionError {
    ConditionError::Unexpected {
        found: found.token.to_string(),
        offset: found.offset,
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_binds_tighter_than_or() {
        let condition = parse_condition("year == 2024 || testValue < 10 && drugId == 'VAN'")
            .expect("should parse");
        assert_eq!(
            condition.to_string(),
            "(year == 2024 || (testValue < 10 && drugId == 'VAN'))"
        );
    }

    #[test]
    fn test_word_operators_and_aliases() {
        let condition = parse_condition(
            "not (context.test_value >= 22) and result in ['S', 'I'] or false",
        )
        .expect("should parse");
        assert_eq!(
            condition.to_string(),
            "((!testValue >= 22 && interpretedResult in ['S', 'I']) || false)"
        );
    }

    #[test]
    fn test_unknown_field_reports_offset() {
        let err = parse_condition("testValue > 2 && organism == 'x'").expect_err("unknown");
        assert_eq!(
            err,
            ConditionError::UnknownField {
                name: "organism".into(),
                offset: 17
            }
        );
    }

    #[test]
    fn test_malformed_conditions_are_errors() {
        assert_eq!(parse_condition("   "), Err(ConditionError::Empty));
        assert!(matches!(
            parse_condition("testValue >="),
            Err(ConditionError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse_condition("(year == 2024"),
            Err(ConditionError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse_condition("year == 2024)"),
            Err(ConditionError::Unexpected { .. })
        ));
        assert!(matches!(
            parse_condition("testValue >= 22 && && year == 1"),
            Err(ConditionError::Unexpected { .. })
        ));
        assert!(matches!(
            parse_condition("drugId in []"),
            Err(ConditionError::Unexpected { .. })
        ));
        assert!(matches!(
            parse_condition("process.exit(1)"),
            Err(ConditionError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_bare_operand_is_type_error() {
        assert!(matches!(
            parse_condition("testValue"),
            Err(ConditionError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_static_type_errors_are_reported_at_parse_time() {
        assert!(matches!(
            parse_condition("drugId > 3"),
            Err(ConditionError::TypeMismatch(_))
        ));
        assert!(matches!(
            parse_condition("interpretedResult == 'MAYBE'"),
            Err(ConditionError::TypeMismatch(_))
        ));
        assert!(matches!(
            parse_condition("testValue == 'high'"),
            Err(ConditionError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_length_and_depth_limits() {
        let long = format!("year == 2024{}", " ".repeat(MAX_CONDITION_LEN));
        assert!(matches!(
            parse_condition(&long),
            Err(ConditionError::TooLong { .. })
        ));

        let deep = format!(
            "{}true{}",
            "(".repeat(MAX_CONDITION_DEPTH + 1),
            ")".repeat(MAX_CONDITION_DEPTH + 1)
        );
        assert!(matches!(
            parse_condition(&deep),
            Err(ConditionError::TooDeep { .. })
        ));

        let nots = format!("{}true", "!".repeat(MAX_CONDITION_DEPTH + 1));
        assert!(matches!(
            parse_condition(&nots),
            Err(ConditionError::TooDeep { .. })
        ));
    }
}
