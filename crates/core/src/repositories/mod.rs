//! Record store collaborators.
//!
//! The core only needs a handful of lookups from its store. They are expressed as traits so a
//! SQL-backed implementation can push the filters into queries; the provided methods filter in
//! memory over `list()`, which is what the bundled tables use.
//!
//! Finders return active *and* retired records. Deciding what is applicable is the core's job.
//!
//! - [`MemoryTable`]: lock-protected in-memory table.
//! - [`YamlTable`]: one YAML document per record under the data directory, written through.

pub mod memory;
pub mod yaml;

pub use memory::MemoryTable;
pub use yaml::YamlTable;

use crate::breakpoints::{BreakpointStandard, TestMethod};
use crate::constants::{BREAKPOINTS_DIR_NAME, EXPERT_RULES_DIR_NAME};
use crate::error::CoreResult;
use crate::rules::ExpertRule;
use chrono::{DateTime, Utc};
use lims_types::{DrugId, MicroorganismId, RuleId, StandardId};
use serde::{de::DeserializeOwned, Serialize};

/// A record type that can live in a [`MemoryTable`] or [`YamlTable`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human-readable record kind used in errors.
    const KIND: &'static str;
    /// Sub-directory of the data directory holding this record type.
    const DIR_NAME: &'static str;

    fn record_id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Record for BreakpointStandard {
    const KIND: &'static str = "breakpoint standard";
    const DIR_NAME: &'static str = BREAKPOINTS_DIR_NAME;

    fn record_id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for ExpertRule {
    const KIND: &'static str = "expert rule";
    const DIR_NAME: &'static str = EXPERT_RULES_DIR_NAME;

    fn record_id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Storage of breakpoint standards.
pub trait BreakpointStandardRepository: Send + Sync {
    /// All standards in insertion order.
    fn list(&self) -> CoreResult<Vec<BreakpointStandard>>;

    fn get(&self, id: &StandardId) -> CoreResult<Option<BreakpointStandard>>;

    /// Stores a new standard; fails with `Conflict` when the id is taken.
    fn insert(&self, standard: BreakpointStandard) -> CoreResult<()>;

    /// Replaces an existing standard; fails with `NotFound` when the id is unknown.
    fn update(&self, standard: BreakpointStandard) -> CoreResult<()>;

    /// Standards for an organism and drug, optionally restricted to one year.
    fn find_by_microorganism_and_drug(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        year: Option<i32>,
    ) -> CoreResult<Vec<BreakpointStandard>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.matches(microorganism_id, drug_id, None))
            .filter(|s| year.map_or(true, |y| s.year == y))
            .collect())
    }

    /// Every published year for an organism and drug, ascending by year.
    fn find_historical_versions(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        method: Option<TestMethod>,
    ) -> CoreResult<Vec<BreakpointStandard>> {
        let mut versions: Vec<BreakpointStandard> = self
            .list()?
            .into_iter()
            .filter(|s| s.matches(microorganism_id, drug_id, method))
            .collect();
        versions.sort_by_key(|s| s.year);
        Ok(versions)
    }
}

/// Storage of expert rules.
pub trait ExpertRuleRepository: Send + Sync {
    /// All rules in insertion order.
    fn list(&self) -> CoreResult<Vec<ExpertRule>>;

    fn get(&self, id: &RuleId) -> CoreResult<Option<ExpertRule>>;

    fn insert(&self, rule: ExpertRule) -> CoreResult<()>;

    fn update(&self, rule: ExpertRule) -> CoreResult<()>;

    /// Rules scoped to exactly this organism and drug.
    fn find_by_microorganism_and_drug(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
    ) -> CoreResult<Vec<ExpertRule>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| {
                r.microorganism_id.as_ref() == Some(microorganism_id)
                    && r.drug_id.as_ref() == Some(drug_id)
            })
            .collect())
    }

    fn find_by_microorganism(
        &self,
        microorganism_id: &MicroorganismId,
    ) -> CoreResult<Vec<ExpertRule>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.microorganism_id.as_ref() == Some(microorganism_id))
            .collect())
    }

    fn find_by_drug(&self, drug_id: &DrugId) -> CoreResult<Vec<ExpertRule>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.drug_id.as_ref() == Some(drug_id))
            .collect())
    }

    fn find_by_year(&self, year: i32) -> CoreResult<Vec<ExpertRule>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.year == Some(year))
            .collect())
    }
}

impl BreakpointStandardRepository for MemoryTable<BreakpointStandard> {
    fn list(&self) -> CoreResult<Vec<BreakpointStandard>> {
        self.all()
    }

    fn get(&self, id: &StandardId) -> CoreResult<Option<BreakpointStandard>> {
        self.find(id.as_str())
    }

    fn insert(&self, standard: BreakpointStandard) -> CoreResult<()> {
        self.add(standard)
    }

    fn update(&self, standard: BreakpointStandard) -> CoreResult<()> {
        self.replace(standard)
    }
}

impl ExpertRuleRepository for MemoryTable<ExpertRule> {
    fn list(&self) -> CoreResult<Vec<ExpertRule>> {
        self.all()
    }

    fn get(&self, id: &RuleId) -> CoreResult<Option<ExpertRule>> {
        self.find(id.as_str())
    }

    fn insert(&self, rule: ExpertRule) -> CoreResult<()> {
        self.add(rule)
    }

    fn update(&self, rule: ExpertRule) -> CoreResult<()> {
        self.replace(rule)
    }
}

impl BreakpointStandardRepository for YamlTable<BreakpointStandard> {
    fn list(&self) -> CoreResult<Vec<BreakpointStandard>> {
        self.all()
    }

    fn get(&self, id: &StandardId) -> CoreResult<Option<BreakpointStandard>> {
        self.find(id.as_str())
    }

    fn insert(&self, standard: BreakpointStandard) -> CoreResult<()> {
        self.add(standard)
    }

    fn update(&self, standard: BreakpointStandard) -> CoreResult<()> {
        self.replace(standard)
    }
}

impl ExpertRuleRepository for YamlTable<ExpertRule> {
    fn list(&self) -> CoreResult<Vec<ExpertRule>> {
        self.all()
    }

    fn get(&self, id: &RuleId) -> CoreResult<Option<ExpertRule>> {
        self.find(id.as_str())
    }

    fn insert(&self, rule: ExpertRule) -> CoreResult<()> {
        self.add(rule)
    }

    fn update(&self, rule: ExpertRule) -> CoreResult<()> {
        self.replace(rule)
    }
}
