//! Record lifecycle shared by breakpoint standards and expert rules.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Whether a record still takes part in interpretation.
///
/// Records are never physically deleted; retiring one is the soft delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    #[default]
    Active,
    Retired,
}

impl Lifecycle {
    pub fn is_active(self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Lifecycle::Active => "ACTIVE",
            Lifecycle::Retired => "RETIRED",
        })
    }
}
