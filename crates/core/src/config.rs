//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Environment variables are parsed by the binaries through the
//! `*_from_env_value` helpers below; nothing in the core reads the process environment while
//! handling a request.

use crate::constants::DEFAULT_DATA_DIR;
use crate::error::{CoreError, CoreResult};
use crate::rules::{OverridePolicy, RuleType};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    override_policy: OverridePolicy,
    auto_validate: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if `data_dir` is not an existing directory.
    pub fn new(
        data_dir: PathBuf,
        override_policy: OverridePolicy,
        auto_validate: bool,
    ) -> CoreResult<Self> {
        if !data_dir.is_dir() {
            return Err(CoreError::InvalidInput(format!(
                "data directory {} does not exist",
                data_dir.display()
            )));
        }

        Ok(Self {
            data_dir,
            override_policy,
            auto_validate,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn override_policy(&self) -> &OverridePolicy {
        &self.override_policy
    }

    /// Whether a clean, high-confidence result is hinted as validated without review.
    pub fn auto_validate(&self) -> bool {
        self.auto_validate
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve the data directory from an optional string value, defaulting to `lims_data`.
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()))
}

/// Parse the override policy from a comma-separated list of rule types.
///
/// If `value` is `None` or empty/whitespace, only intrinsic resistance forces an override.
pub fn override_policy_from_env_value(value: Option<String>) -> CoreResult<OverridePolicy> {
    let Some(value) = non_blank(value) else {
        return Ok(OverridePolicy::default());
    };

    let types = value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<RuleType>().map_err(CoreError::InvalidInput))
        .collect::<CoreResult<Vec<RuleType>>>()?;

    Ok(OverridePolicy::new(types))
}

/// Parse the auto-validate flag. Defaults to `true`.
pub fn auto_validate_from_env_value(value: Option<String>) -> CoreResult<bool> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(true),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(other) => Err(CoreError::InvalidInput(format!(
            "'{other}' is not a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_override_policy_defaults_to_intrinsic_only() {
        let policy = override_policy_from_env_value(None).unwrap();
        assert_eq!(policy.types().collect::<Vec<_>>(), vec![RuleType::IntrinsicResistance]);

        let policy = override_policy_from_env_value(Some("  ".into())).unwrap();
        assert_eq!(policy, OverridePolicy::default());
    }

    #[test]
    fn test_override_policy_parses_list() {
        let policy =
            override_policy_from_env_value(Some("exceptional_phenotype, QUALITY_CONTROL".into()))
                .unwrap();
        assert!(policy.forces_override(RuleType::IntrinsicResistance));
        assert!(policy.forces_override(RuleType::ExceptionalPhenotype));
        assert!(policy.forces_override(RuleType::QualityControl));

        assert!(matches!(
            override_policy_from_env_value(Some("EVERYTHING".into())),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_auto_validate_values() {
        assert!(auto_validate_from_env_value(None).unwrap());
        assert!(!auto_validate_from_env_value(Some("False".into())).unwrap());
        assert!(auto_validate_from_env_value(Some("maybe".into())).is_err());
    }

    #[test]
    fn test_config_requires_existing_data_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::new(temp_dir.path().to_path_buf(), OverridePolicy::default(), true)
            .expect("existing dir");
        assert_eq!(cfg.data_dir(), temp_dir.path());

        let missing = temp_dir.path().join("missing");
        assert!(CoreConfig::new(missing, OverridePolicy::default(), true).is_err());
        assert_eq!(
            data_dir_from_env_value(None),
            PathBuf::from(DEFAULT_DATA_DIR)
        );
    }
}
