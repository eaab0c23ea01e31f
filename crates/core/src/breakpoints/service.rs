//! Breakpoint standard lookups and lifecycle operations.

use super::model::{BreakpointStandard, BreakpointUpdate, NewBreakpointStandard, TestMethod};
use super::versions::{compare, BreakpointChange};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::Lifecycle;
use crate::repositories::BreakpointStandardRepository;
use crate::validation::{validate_bounds, validate_year};
use chrono::Utc;
use lims_types::{DrugId, MicroorganismId, StandardId};
use std::sync::{Arc, Mutex};

/// Returns the standard with the greatest year.
///
/// When several standards share the greatest year (a data-entry error) the first one in
/// iteration order wins and the tie is logged.
pub fn select_latest(
    standards: impl IntoIterator<Item = BreakpointStandard>,
) -> Option<BreakpointStandard> {
    let mut latest: Option<BreakpointStandard> = None;
    let mut tied: Vec<StandardId> = Vec::new();

    for standard in standards {
        let newer = match &latest {
            None => true,
            Some(current) => {
                if standard.year == current.year {
                    tied.push(standard.id.clone());
                }
                standard.year > current.year
            }
        };
        if newer {
            tied.clear();
            latest = Some(standard);
        }
    }

    if let Some(chosen) = &latest {
        if !tied.is_empty() {
            tracing::warn!(
                year = chosen.year,
                chosen = %chosen.id,
                ignored = ?tied,
                "multiple breakpoint standards share the latest year"
            );
        }
    }

    latest
}

/// Service over a [`BreakpointStandardRepository`].
///
/// Only active standards take part in interpretation; retired ones remain visible to
/// `list_for` for audit.
///
/// Writes through one service (and its clones) are serialised, so the unique-key check in
/// `create` and the insert that follows it cannot interleave with another write.
#[derive(Clone)]
pub struct BreakpointService {
    repo: Arc<dyn BreakpointStandardRepository>,
    writes: Arc<Mutex<()>>,
}

impl BreakpointService {
    pub fn new(repo: Arc<dyn BreakpointStandardRepository>) -> Self {
        Self {
            repo,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// The active standard with the maximum year, optionally restricted to one method.
    ///
    /// Returns `Ok(None)` when nothing applies.
    pub fn latest(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        method: Option<TestMethod>,
    ) -> CoreResult<Option<BreakpointStandard>> {
        let candidates = self
            .repo
            .find_by_microorganism_and_drug(microorganism_id, drug_id, None)?
            .into_iter()
            .filter(|s| s.is_active() && method.map_or(true, |m| s.method == m));
        Ok(select_latest(candidates))
    }

    /// The active standard published for exactly `year`.
    pub fn for_year(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        year: i32,
        method: Option<TestMethod>,
    ) -> CoreResult<Option<BreakpointStandard>> {
        let candidates = self
            .repo
            .find_by_microorganism_and_drug(microorganism_id, drug_id, Some(year))?
            .into_iter()
            .filter(|s| s.is_active() && method.map_or(true, |m| s.method == m));
        Ok(select_latest(candidates))
    }

    /// Resolves the exact year when given, otherwise the latest.
    pub fn resolve(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        method: TestMethod,
        year: Option<i32>,
    ) -> CoreResult<Option<BreakpointStandard>> {
        match year {
            Some(year) => self.for_year(microorganism_id, drug_id, year, Some(method)),
            None => self.latest(microorganism_id, drug_id, Some(method)),
        }
    }

    /// Every stored standard (active and retired) for an organism and drug.
    pub fn list_for(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        year: Option<i32>,
    ) -> CoreResult<Vec<BreakpointStandard>> {
        self.repo
            .find_by_microorganism_and_drug(microorganism_id, drug_id, year)
    }

    pub fn get(&self, id: &StandardId) -> CoreResult<Option<BreakpointStandard>> {
        self.repo.get(id)
    }

    /// Changes between consecutive years of the active standards.
    pub fn compare(
        &self,
        microorganism_id: &MicroorganismId,
        drug_id: &DrugId,
        method: Option<TestMethod>,
    ) -> CoreResult<Vec<BreakpointChange>> {
        let history: Vec<BreakpointStandard> = self
            .repo
            .find_historical_versions(microorganism_id, drug_id, method)?
            .into_iter()
            .filter(BreakpointStandard::is_active)
            .collect();
        Ok(compare(&history, method))
    }

    /// Registers a new standard.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if the year or bounds are invalid and
    /// `CoreError::Conflict` if an active standard already exists for the same organism, drug,
    /// method and year.
    pub fn create(&self, new: NewBreakpointStandard) -> CoreResult<BreakpointStandard> {
        validate_year(new.year)?;
        validate_bounds(new.method, &new.bounds)?;
        let _writes = self.writes.lock().map_err(|_| CoreError::LockPoisoned)?;

        let clash = self
            .repo
            .find_by_microorganism_and_drug(&new.microorganism_id, &new.drug_id, Some(new.year))?
            .into_iter()
            .find(|s| s.is_active() && s.method == new.method);
        if let Some(existing) = clash {
            return Err(CoreError::Conflict(format!(
                "an active {} standard for {}/{} in {} already exists ({})",
                new.method, new.microorganism_id, new.drug_id, new.year, existing.id
            )));
        }

        let now = Utc::now();
        let standard = BreakpointStandard {
            id: StandardId::parse(uuid::Uuid::new_v4().simple().to_string())?,
            microorganism_id: new.microorganism_id,
            drug_id: new.drug_id,
            year: new.year,
            method: new.method,
            bounds: new.bounds,
            notes: new.notes,
            source_document: new.source_document,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };

        self.repo.insert(standard.clone())?;
        tracing::info!(
            id = %standard.id,
            year = standard.year,
            method = %standard.method,
            "created breakpoint standard"
        );
        Ok(standard)
    }

    /// Replaces the bounds, notes and source document of a standard.
    pub fn update(&self, id: &StandardId, update: BreakpointUpdate) -> CoreResult<BreakpointStandard> {
        let _writes = self.writes.lock().map_err(|_| CoreError::LockPoisoned)?;
        let mut standard = self.require(id)?;
        validate_bounds(standard.method, &update.bounds)?;

        standard.bounds = update.bounds;
        standard.notes = update.notes;
        standard.source_document = update.source_document;
        standard.updated_at = Utc::now();

        self.repo.update(standard.clone())?;
        Ok(standard)
    }

    /// Retires a standard so it no longer takes part in interpretation.
    pub fn retire(&self, id: &StandardId) -> CoreResult<BreakpointStandard> {
        let _writes = self.writes.lock().map_err(|_| CoreError::LockPoisoned)?;
        let mut standard = self.require(id)?;
        if standard.lifecycle == Lifecycle::Retired {
            return Ok(standard);
        }

        standard.lifecycle = Lifecycle::Retired;
        standard.updated_at = Utc::now();
        self.repo.update(standard.clone())?;
        tracing::info!(id = %standard.id, "retired breakpoint standard");
        Ok(standard)
    }

    fn require(&self, id: &StandardId) -> CoreResult<BreakpointStandard> {
        self.repo.get(id)?.ok_or_else(|| CoreError::NotFound {
            kind: "breakpoint standard",
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::model::BreakpointBounds;
    use crate::repositories::MemoryTable;

    fn ids() -> (MicroorganismId, DrugId) {
        (
            MicroorganismId::parse("sau").unwrap(),
            DrugId::parse("oxa").unwrap(),
        )
    }

    fn new_disk(year: i32, s_min: f64, r_max: f64) -> NewBreakpointStandard {
        let (m, d) = ids();
        NewBreakpointStandard {
            microorganism_id: m,
            drug_id: d,
            year,
            method: TestMethod::DiskDiffusion,
            bounds: BreakpointBounds {
                susceptible_min: Some(s_min),
                resistant_max: Some(r_max),
                ..Default::default()
            },
            notes: None,
            source_document: Some("CLSI M100".into()),
        }
    }

    fn service() -> BreakpointService {
        BreakpointService::new(Arc::new(MemoryTable::<BreakpointStandard>::new()))
    }

    #[test]
    fn test_latest_returns_maximum_year() {
        let svc = service();
        svc.create(new_disk(2021, 18.0, 17.0)).unwrap();
        svc.create(new_disk(2024, 22.0, 21.0)).unwrap();
        svc.create(new_disk(2022, 20.0, 19.0)).unwrap();

        let (m, d) = ids();
        for _ in 0..3 {
            let latest = svc.latest(&m, &d, None).unwrap().expect("latest");
            assert_eq!(latest.year, 2024);
        }
    }

    #[test]
    fn test_latest_ignores_retired_and_other_methods() {
        let svc = service();
        svc.create(new_disk(2022, 20.0, 19.0)).unwrap();
        let newest = svc.create(new_disk(2024, 22.0, 21.0)).unwrap();
        svc.retire(&newest.id).unwrap();

        let (m, d) = ids();
        assert_eq!(svc.latest(&m, &d, None).unwrap().unwrap().year, 2022);
        assert!(svc.latest(&m, &d, Some(TestMethod::Mic)).unwrap().is_none());
    }

    #[test]
    fn test_missing_standard_is_none_not_error() {
        let svc = service();
        let (m, d) = ids();
        assert!(svc.latest(&m, &d, None).unwrap().is_none());
        assert!(svc
            .resolve(&m, &d, TestMethod::DiskDiffusion, Some(1999))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_select_latest_tie_picks_first_found() {
        let svc = service();
        let first = svc.create(new_disk(2023, 20.0, 19.0)).unwrap();
        let mut second = first.clone();
        second.id = StandardId::parse("second").unwrap();
        second.bounds.susceptible_min = Some(25.0);

        let chosen = select_latest(vec![first.clone(), second.clone()]).unwrap();
        assert_eq!(chosen.id, first.id);
        let chosen = select_latest(vec![second.clone(), first]).unwrap();
        assert_eq!(chosen.id, second.id);
    }

    #[test]
    fn test_create_rejects_second_active_standard_for_same_key() {
        let svc = service();
        svc.create(new_disk(2024, 22.0, 21.0)).unwrap();
        let err = svc
            .create(new_disk(2024, 23.0, 20.0))
            .expect_err("duplicate key");
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_concurrent_creates_for_same_key_admit_one() {
        let svc = service();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let svc = svc.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    svc.create(new_disk(2024, 22.0 + n as f64, 21.0))
                })
            })
            .collect();

        let outcomes: Vec<CoreResult<BreakpointStandard>> = handles
            .into_iter()
            .map(|h| h.join().expect("create thread"))
            .collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|e| matches!(e, CoreError::Conflict(_))));

        let (m, d) = ids();
        assert_eq!(svc.list_for(&m, &d, Some(2024)).unwrap().len(), 1);
    }

    #[test]
    fn test_update_keeps_identity_and_bumps_timestamp() {
        let svc = service();
        let created = svc.create(new_disk(2024, 22.0, 21.0)).unwrap();

        let updated = svc
            .update(
                &created.id,
                BreakpointUpdate {
                    bounds: BreakpointBounds {
                        susceptible_min: Some(21.0),
                        resistant_max: Some(17.0),
                        ..Default::default()
                    },
                    notes: Some("aligned with Ed34".into()),
                    source_document: created.source_document.clone(),
                },
            )
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.year, created.year);
        assert_eq!(updated.bounds.resistant_max, Some(17.0));
        assert!(updated.updated_at >= created.updated_at);
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let svc = service();
        let err = svc
            .retire(&StandardId::parse("nope").unwrap())
            .expect_err("unknown id");
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_compare_uses_history() {
        let svc = service();
        svc.create(new_disk(2023, 20.0, 19.0)).unwrap();
        svc.create(new_disk(2024, 22.0, 19.0)).unwrap();

        let (m, d) = ids();
        let changes = svc.compare(&m, &d, None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous_year, 2023);
    }
}
