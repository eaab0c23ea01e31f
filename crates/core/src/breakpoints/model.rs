//! Breakpoint standard records and the enumerations shared by the interpretation pipeline.

use crate::lifecycle::Lifecycle;
use chrono::{DateTime, Utc};
use lims_types::{DrugId, MicroorganismId, StandardId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Susceptibility test method.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestMethod {
    /// Inhibition zone diameter in mm; larger is more susceptible.
    DiskDiffusion,
    /// Minimum inhibitory concentration in µg/mL; smaller is more susceptible.
    Mic,
}

impl TestMethod {
    pub fn code(self) -> &'static str {
        match self {
            TestMethod::DiskDiffusion => "DISK_DIFFUSION",
            TestMethod::Mic => "MIC",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            TestMethod::DiskDiffusion => "mm",
            TestMethod::Mic => "µg/mL",
        }
    }

    /// Human-readable description of a raw measurement, e.g. `Zone diameter: 18mm`.
    pub fn describe_value(self, value: f64) -> String {
        match self {
            TestMethod::DiskDiffusion => format!("Zone diameter: {}mm", format_number(value)),
            TestMethod::Mic => format!("MIC: {} µg/mL", format_number(value)),
        }
    }
}

impl fmt::Display for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "DISK_DIFFUSION" | "DISK" | "ZONE" => Ok(TestMethod::DiskDiffusion),
            "MIC" => Ok(TestMethod::Mic),
            other => Err(format!("'{other}' is not a test method")),
        }
    }
}

/// Susceptible / Intermediate / Resistant categorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensitivityResult {
    Susceptible,
    Intermediate,
    Resistant,
}

impl SensitivityResult {
    pub fn code(self) -> &'static str {
        match self {
            SensitivityResult::Susceptible => "SUSCEPTIBLE",
            SensitivityResult::Intermediate => "INTERMEDIATE",
            SensitivityResult::Resistant => "RESISTANT",
        }
    }

    /// Position on the susceptible-to-resistant scale, 0 being susceptible.
    pub fn severity(self) -> u8 {
        match self {
            SensitivityResult::Susceptible => 0,
            SensitivityResult::Intermediate => 1,
            SensitivityResult::Resistant => 2,
        }
    }
}

impl fmt::Display for SensitivityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SensitivityResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S" | "SUSCEPTIBLE" => Ok(SensitivityResult::Susceptible),
            "I" | "INTERMEDIATE" => Ok(SensitivityResult::Intermediate),
            "R" | "RESISTANT" => Ok(SensitivityResult::Resistant),
            other => Err(format!("'{other}' is not a susceptibility result")),
        }
    }
}

/// Confidence attached to an interpretation or a rule match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        })
    }
}

/// Numeric cutoffs of a breakpoint standard.
///
/// Disk diffusion populates the descending mm thresholds (`susceptible_min`, `resistant_max`),
/// MIC the ascending µg/mL thresholds (`susceptible_max`, `resistant_min`). Unused bounds stay
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BreakpointBounds {
    #[serde(default)]
    pub susceptible_min: Option<f64>,
    #[serde(default)]
    pub susceptible_max: Option<f64>,
    #[serde(default)]
    pub intermediate_min: Option<f64>,
    #[serde(default)]
    pub intermediate_max: Option<f64>,
    #[serde(default)]
    pub resistant_min: Option<f64>,
    #[serde(default)]
    pub resistant_max: Option<f64>,
}

impl BreakpointBounds {
    pub(crate) fn named(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("susceptible_min", self.susceptible_min),
            ("susceptible_max", self.susceptible_max),
            ("intermediate_min", self.intermediate_min),
            ("intermediate_max", self.intermediate_max),
            ("resistant_min", self.resistant_min),
            ("resistant_max", self.resistant_max),
        ]
    }

    pub fn has_intermediate_range(&self) -> bool {
        self.intermediate_min.is_some() || self.intermediate_max.is_some()
    }
}

/// A year-versioned set of cutoffs for one (microorganism, drug, method) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BreakpointStandard {
    pub id: StandardId,
    pub microorganism_id: MicroorganismId,
    pub drug_id: DrugId,
    pub year: i32,
    pub method: TestMethod,
    #[serde(flatten)]
    pub bounds: BreakpointBounds,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source_document: Option<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BreakpointStandard {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Human-readable reference written onto lab results, e.g. `CLSI M100 2024 MIC (3f2a...)`.
    pub fn reference(&self) -> String {
        let source = self
            .source_document
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("CLSI");
        format!("{} {} {} ({})", source, self.year, self.method, self.id)
    }

    /// Whether this standard applies to the given organism, drug and optional method.
    pub fn matches(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        method: Option<TestMethod>,
    ) -> bool {
        &self.microorganism_id == microorganism_id
            && &self.drug_id == drug_id
            && method.map_or(true, |m| m == self.method)
    }
}

/// Fields supplied when registering a new breakpoint standard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewBreakpointStandard {
    pub microorganism_id: MicroorganismId,
    pub drug_id: DrugId,
    pub year: i32,
    pub method: TestMethod,
    #[serde(flatten)]
    pub bounds: BreakpointBounds,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source_document: Option<String>,
}

/// Mutable fields of a breakpoint standard. Identity (organism, drug, method, year) is fixed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BreakpointUpdate {
    #[serde(flatten)]
    pub bounds: BreakpointBounds,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source_document: Option<String>,
}

/// Formats a measurement without a trailing `.0` for whole numbers.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
