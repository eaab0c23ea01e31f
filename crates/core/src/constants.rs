//! Constants used throughout the LIMS core crate.
//!
//! Storage layout names and the numeric thresholds of the interpretation pipeline live here so
//! that the REST layer, the CLI and the tests agree on them.

/// Default directory for the YAML record store when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "lims_data";

/// Directory name for breakpoint standard records.
pub const BREAKPOINTS_DIR_NAME: &str = "breakpoints";

/// Directory name for expert rule records.
pub const EXPERT_RULES_DIR_NAME: &str = "expert_rules";

/// File extension for stored records.
pub const RECORD_FILE_EXTENSION: &str = "yaml";

/// Disk diffusion margin (mm) from the nearest boundary that counts as high confidence.
pub const DISK_HIGH_MARGIN_MM: f64 = 3.0;

/// Disk diffusion margin (mm) from the nearest boundary that counts as medium confidence.
pub const DISK_MEDIUM_MARGIN_MM: f64 = 1.0;

/// MIC ratio (value / susceptible breakpoint) at or below which a susceptible call is high confidence.
pub const MIC_SUSCEPTIBLE_HIGH_RATIO: f64 = 0.5;

/// MIC ratio at or below which a susceptible call is medium confidence.
pub const MIC_SUSCEPTIBLE_MEDIUM_RATIO: f64 = 0.8;

/// MIC ratio (value / resistant breakpoint) at or above which a resistant call is high confidence.
pub const MIC_RESISTANT_HIGH_RATIO: f64 = 2.0;

/// MIC ratio at or above which a resistant call is medium confidence.
pub const MIC_RESISTANT_MEDIUM_RATIO: f64 = 1.5;

/// Fraction of a rule threshold a numeric comparison must clear to count as a clear match.
pub const RULE_CLEAR_MARGIN_FRACTION: f64 = 0.1;

/// Absolute margin that counts as a clear match against a zero threshold.
pub const RULE_CLEAR_MARGIN_FLOOR: f64 = 1.0;

/// Maximum accepted length of a rule condition expression.
pub const MAX_CONDITION_LEN: usize = 4_096;

/// Maximum nesting depth of a rule condition expression.
pub const MAX_CONDITION_DEPTH: usize = 64;
