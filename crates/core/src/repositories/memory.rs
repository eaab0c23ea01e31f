//! In-memory record table.

use super::Record;
use crate::error::{CoreError, CoreResult};
use std::sync::RwLock;

/// A lock-protected, insertion-ordered table of records.
#[derive(Debug)]
pub struct MemoryTable<T> {
    rows: RwLock<Vec<T>>,
}

impl<T: Record> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryTable<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Builds a table from existing records, rejecting duplicate ids.
    pub fn with_records(records: impl IntoIterator<Item = T>) -> CoreResult<Self> {
        let table = Self::new();
        for record in records {
            table.add(record)?;
        }
        Ok(table)
    }

    pub fn all(&self) -> CoreResult<Vec<T>> {
        let rows = self.rows.read().map_err(|_| CoreError::LockPoisoned)?;
        Ok(rows.clone())
    }

    pub fn find(&self, id: &str) -> CoreResult<Option<T>> {
        let rows = self.rows.read().map_err(|_| CoreError::LockPoisoned)?;
        Ok(rows.iter().find(|r| r.record_id() == id).cloned())
    }

    pub fn add(&self, record: T) -> CoreResult<()> {
        let mut rows = self.rows.write().map_err(|_| CoreError::LockPoisoned)?;
        if rows.iter().any(|r| r.record_id() == record.record_id()) {
            return Err(CoreError::Conflict(format!(
                "{} {} already exists",
                T::KIND,
                record.record_id()
            )));
        }
        rows.push(record);
        Ok(())
    }

    /// Replaces a record in place, keeping its position.
    pub fn replace(&self, record: T) -> CoreResult<()> {
        let mut rows = self.rows.write().map_err(|_| CoreError::LockPoisoned)?;
        let slot = rows
            .iter_mut()
            .find(|r| r.record_id() == record.record_id())
            .ok_or_else(|| CoreError::NotFound {
                kind: T::KIND,
                id: record.record_id().to_owned(),
            })?;
        *slot = record;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use crate::rules::{ExpertRule, RuleType};
    use chrono::Utc;
    use lims_types::{NonEmptyText, RuleId};

    fn rule(id: &str, priority: i32) -> ExpertRule {
        let now = Utc::now();
        ExpertRule {
            id: RuleId::parse(id).unwrap(),
            name: NonEmptyText::new(format!("rule {id}")).unwrap(),
            description: None,
            rule_type: RuleType::InterpretiveComment,
            condition: "true".into(),
            action: "Note".into(),
            priority,
            year: Some(2024),
            microorganism_id: None,
            drug_id: None,
            source_reference: None,
            notes: None,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_replace_keeps_insertion_position() {
        let table = MemoryTable::with_records(vec![rule("a", 1), rule("b", 2), rule("c", 3)])
            .expect("unique ids");
        table.replace(rule("b", 20)).expect("replace");

        let rows = table.all().unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(rows[1].priority, 20);
    }

    #[test]
    fn test_duplicate_and_unknown_ids() {
        let table = MemoryTable::with_records(vec![rule("a", 1)]).expect("unique ids");
        assert!(matches!(table.add(rule("a", 2)), Err(CoreError::Conflict(_))));
        assert!(matches!(
            table.replace(rule("missing", 1)),
            Err(CoreError::NotFound { .. })
        ));
        assert!(table.find("missing").unwrap().is_none());
    }
}
