//! Application storage with optimistic versioning
//!
//! Every update names the version it was read at. A store holding a newer
//! version refuses the write, so two deciders cannot both act on the same
//! state.

use super::domain::{ApplicationId, ApplicationRecord};
use crate::case::CaseId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage abstraction so the service can run against memory or disk
pub trait ApplicationRepository: Send + Sync {
    /// Store a new record at version 1
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    /// Replace a record last read at `expected_version`; returns the stored copy
    fn update(
        &self,
        record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Applications not yet final or withdrawn, oldest first
    fn pending(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    /// Next free application number for a case, counting every record ever
    /// lodged against it
    fn next_sequence(&self, case_id: &CaseId) -> Result<u64, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale version: expected {expected}, found {actual}")]
    StaleVersion { expected: u64, actual: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

fn check_version(stored: &ApplicationRecord, expected: u64) -> Result<(), RepositoryError> {
    if stored.version != expected {
        return Err(RepositoryError::StaleVersion {
            expected,
            actual: stored.version,
        });
    }
    Ok(())
}

fn select_pending(records: impl Iterator<Item = ApplicationRecord>, limit: usize) -> Vec<ApplicationRecord> {
    let mut pending: Vec<ApplicationRecord> = records.filter(|r| !r.status.is_terminal()).collect();
    pending.sort_by(|a, b| a.lodged_on.cmp(&b.lodged_on).then_with(|| a.id.cmp(&b.id)));
    pending.truncate(limit);
    pending
}

fn sequence_after(records: impl Iterator<Item = ApplicationRecord>, case_id: &CaseId) -> u64 {
    records.filter(|r| &r.case_id == case_id).count() as u64 + 1
}

// ============================================================================
// In memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryApplicationRepository {
    records: Mutex<BTreeMap<ApplicationId, ApplicationRecord>>,
}

impl MemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<ApplicationId, ApplicationRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("application store lock poisoned".to_string()))
    }
}

impl ApplicationRepository for MemoryApplicationRepository {
    fn insert(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut records = self.lock()?;
        if records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        record.version = 1;
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        mut record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut records = self.lock()?;
        let stored = records.get(&record.id).ok_or(RepositoryError::NotFound)?;
        check_version(stored, expected_version)?;
        record.version = expected_version + 1;
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn pending(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let records = self.lock()?;
        Ok(select_pending(records.values().cloned(), limit))
    }

    fn next_sequence(&self, case_id: &CaseId) -> Result<u64, RepositoryError> {
        let records = self.lock()?;
        Ok(sequence_after(records.values().cloned(), case_id))
    }
}

// ============================================================================
// JSON files
// ============================================================================

/// One JSON file per application under a directory.
///
/// Writes go to a temporary file that is then renamed over the record, so
/// a reader never sees a half-written file. A process-wide lock serializes
/// the read-check-write of each update.
#[derive(Debug)]
pub struct JsonFileApplicationRepository {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileApplicationRepository {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, RepositoryError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| unavailable(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ApplicationId) -> PathBuf {
        json_path(&self.dir, &id.0)
    }

    fn read(&self, path: &Path) -> Result<Option<ApplicationRecord>, RepositoryError> {
        read_json(path)
    }

    fn write(&self, record: &ApplicationRecord) -> Result<(), RepositoryError> {
        write_json(&self.path_for(&record.id), record)
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, RepositoryError> {
        self.write_lock
            .lock()
            .map_err(|_| RepositoryError::Unavailable("application file lock poisoned".to_string()))
    }

    fn scan(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| unavailable(&self.dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| unavailable(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = self.read(&path)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

// ----------------------------------------------------------------------------
// File helpers shared with the file-backed ledger
// ----------------------------------------------------------------------------

/// `<dir>/<key>.json`, with anything outside `[A-Za-z0-9_-]` replaced
pub(crate) fn json_path(dir: &Path, key: &str) -> PathBuf {
    let name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{name}.json"))
}

/// A missing file reads as `None`
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RepositoryError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(unavailable(path, e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| RepositoryError::Unavailable(format!("corrupt record {}: {e}", path.display())))
}

/// Write to a sibling `.json.tmp` and rename it over `path`
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let staging = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| RepositoryError::Unavailable(format!("cannot encode {}: {e}", path.display())))?;
    fs::write(&staging, json).map_err(|e| unavailable(&staging, e))?;
    fs::rename(&staging, path).map_err(|e| unavailable(path, e))
}

pub(crate) fn unavailable(path: &Path, error: std::io::Error) -> RepositoryError {
    RepositoryError::Unavailable(format!("{}: {error}", path.display()))
}

impl ApplicationRepository for JsonFileApplicationRepository {
    fn insert(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let _guard = self.guard()?;
        if self.read(&self.path_for(&record.id))?.is_some() {
            return Err(RepositoryError::Conflict);
        }
        record.version = 1;
        self.write(&record)?;
        Ok(record)
    }

    fn update(
        &self,
        mut record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let _guard = self.guard()?;
        let stored = self
            .read(&self.path_for(&record.id))?
            .ok_or(RepositoryError::NotFound)?;
        check_version(&stored, expected_version)?;
        record.version = expected_version + 1;
        self.write(&record)?;
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.read(&self.path_for(id))
    }

    fn pending(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(select_pending(self.scan()?.into_iter(), limit))
    }

    fn next_sequence(&self, case_id: &CaseId) -> Result<u64, RepositoryError> {
        let _guard = self.guard()?;
        Ok(sequence_after(self.scan()?.into_iter(), case_id))
    }
}
