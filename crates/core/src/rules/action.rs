//! Directives embedded in a rule's free-form action text.
//!
//! Two directives are recognised, case-insensitively:
//! - `OVERRIDE:<RESULT>` (or `OVERRIDE: <RESULT>`) forces the final result, e.g.
//!   `OVERRIDE:RESISTANT` or `override:R`.
//! - `REVIEW` demands human review before release.
//!
//! Everything else is advisory text carried into the notes.

use crate::breakpoints::SensitivityResult;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("OVERRIDE directive has no result")]
    MissingOverrideResult,
    #[error("OVERRIDE directive names an unknown result: {0}")]
    InvalidOverrideResult(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleAction {
    pub override_to: Option<SensitivityResult>,
    pub requires_review: bool,
}

impl RuleAction {
    pub fn parse(text: &str) -> Result<Self, ActionError> {
        let mut action = RuleAction::default();
        let mut words = text
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == ':' || c == '_'))
            .filter(|w| !w.is_empty())
            .map(str::to_ascii_uppercase);

        while let Some(word) = words.next() {
            if word == "REVIEW" {
                action.requires_review = true;
                continue;
            }
            let Some(rest) = word.strip_prefix("OVERRIDE:") else {
                continue;
            };
            let target = if rest.is_empty() {
                words.next().ok_or(ActionError::MissingOverrideResult)?
            } else {
                rest.to_owned()
            };
            let result = target
                .parse::<SensitivityResult>()
                .map_err(|_| ActionError::InvalidOverrideResult(target.clone()))?;
            action.override_to = Some(result);
        }

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_has_no_directives() {
        let action = RuleAction::parse("Report as resistant; penicillinase producer.").unwrap();
        assert_eq!(action, RuleAction::default());
    }

    #[test]
    fn test_override_and_review_directives() {
        let action = RuleAction::parse("override:r. Please REVIEW the isolate.").unwrap();
        assert_eq!(action.override_to, Some(SensitivityResult::Resistant));
        assert!(action.requires_review);

        let action = RuleAction::parse("OVERRIDE: INTERMEDIATE").unwrap();
        assert_eq!(action.override_to, Some(SensitivityResult::Intermediate));
        assert!(!action.requires_review);
    }

    #[test]
    fn test_review_must_be_a_whole_word() {
        let action = RuleAction::parse("Reviewed by the committee").unwrap();
        assert!(!action.requires_review);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        assert_eq!(
            RuleAction::parse("OVERRIDE:"),
            Err(ActionError::MissingOverrideResult)
        );
        assert_eq!(
            RuleAction::parse("OVERRIDE:MAYBE"),
            Err(ActionError::InvalidOverrideResult("MAYBE".into()))
        );
    }
}
