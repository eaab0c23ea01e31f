//! YAML-directory record table.
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//!   breakpoints/
//!     <standard-id>.yaml
//!   expert_rules/
//!     <rule-id>.yaml
//! ```
//!
//! Every record is one YAML document named after its id. The directory is read once when the
//! table is opened; afterwards reads are served from memory and every insert or update is
//! written to disk before it becomes visible in memory.

use super::memory::MemoryTable;
use super::Record;
use crate::constants::RECORD_FILE_EXTENSION;
use crate::error::{CoreError, CoreResult};
use crate::validation::validate_record_file_stem;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A [`MemoryTable`] persisted as one YAML file per record.
///
/// Writers are serialised so the file on disk and the row in memory always hold the same
/// version. A record becomes visible to readers only after its file has been written.
#[derive(Debug)]
pub struct YamlTable<T> {
    dir: PathBuf,
    rows: MemoryTable<T>,
    writer: Mutex<()>,
}

/// Parses one record file, reporting the field path on failure.
pub fn load_record<T: Record>(path: &Path) -> CoreResult<T> {
    let contents = fs::read_to_string(path).map_err(CoreError::FileRead)?;
    let de = serde_yaml::Deserializer::from_str(&contents);
    serde_path_to_error::deserialize(de).map_err(|source| CoreError::YamlDeserialization {
        path: path.to_path_buf(),
        source,
    })
}

impl<T: Record> YamlTable<T> {
    /// Opens (creating if needed) the record directory for `T` under `data_dir` and loads it.
    ///
    /// Files that do not parse, or whose name does not match the record id inside, are skipped
    /// with a warning so one bad file cannot take the whole store offline.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StorageDirCreation` if the directory cannot be created and
    /// `CoreError::FileRead` if it cannot be listed.
    pub fn open(data_dir: &Path) -> CoreResult<Self> {
        let dir = data_dir.join(T::DIR_NAME);
        fs::create_dir_all(&dir).map_err(CoreError::StorageDirCreation)?;

        let mut records: Vec<T> = Vec::new();
        for entry in fs::read_dir(&dir).map_err(CoreError::FileRead)? {
            let path = entry.map_err(CoreError::FileRead)?.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(RECORD_FILE_EXTENSION)
            {
                continue;
            }

            let record: T = match load_record(&path) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("skipping unreadable {} file: {}", T::KIND, e);
                    continue;
                }
            };

            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            if stem != record.record_id() {
                tracing::warn!(
                    "skipping {} file {}: id {} does not match file name",
                    T::KIND,
                    path.display(),
                    record.record_id()
                );
                continue;
            }

            records.push(record);
        }

        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.record_id().cmp(b.record_id()))
        });

        tracing::debug!("loaded {} {} records from {}", records.len(), T::KIND, dir.display());

        Ok(Self {
            dir,
            rows: MemoryTable::with_records(records)?,
            writer: Mutex::new(()),
        })
    }

    pub fn all(&self) -> CoreResult<Vec<T>> {
        self.rows.all()
    }

    pub fn find(&self, id: &str) -> CoreResult<Option<T>> {
        self.rows.find(id)
    }

    pub fn add(&self, record: T) -> CoreResult<()> {
        validate_record_file_stem(record.record_id())?;
        let _writer = self.writer.lock().map_err(|_| CoreError::LockPoisoned)?;

        if self.rows.find(record.record_id())?.is_some() {
            return Err(CoreError::Conflict(format!(
                "{} {} already exists",
                T::KIND,
                record.record_id()
            )));
        }
        self.write(&record)?;
        self.rows.add(record)
    }

    pub fn replace(&self, record: T) -> CoreResult<()> {
        let _writer = self.writer.lock().map_err(|_| CoreError::LockPoisoned)?;

        if self.rows.find(record.record_id())?.is_none() {
            return Err(CoreError::NotFound {
                kind: T::KIND,
                id: record.record_id().to_owned(),
            });
        }
        self.write(&record)?;
        self.rows.replace(record)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_FILE_EXTENSION}"))
    }

    fn write(&self, record: &T) -> CoreResult<()> {
        let id = record.record_id();
        validate_record_file_stem(id)?;

        let yaml = serde_yaml::to_string(record).map_err(CoreError::YamlSerialization)?;
        let tmp = self.dir.join(format!(".{id}.{RECORD_FILE_EXTENSION}.tmp"));
        fs::write(&tmp, yaml).map_err(CoreError::FileWrite)?;
        if let Err(e) = fs::rename(&tmp, self.path_for(id)) {
            let _ = fs::remove_file(&tmp);
            return Err(CoreError::FileWrite(e));
        }
        Ok(())
    }
}
