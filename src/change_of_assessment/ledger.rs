//! Assessment supersession chain per case
//!
//! Assessments are appended, never replaced. Appending names the head the
//! caller read; if another writer moved the head first the append fails
//! and the caller re-evaluates against the new head.

use super::domain::ApplicationId;
use super::repository::{json_path, read_json, unavailable, write_json, RepositoryError};
use crate::assessment::{Assessment, AssessmentId, AssessmentOverrides};
use crate::case::{CaseId, CaseSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// An assessment with the inputs that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub assessment: Assessment,
    pub snapshot: CaseSnapshot,
    /// Every adjustment in force, accumulated across decisions
    pub overrides: AssessmentOverrides,
    /// Application whose decision produced this assessment
    pub source: Option<ApplicationId>,
}

pub trait AssessmentLedger: Send + Sync {
    fn head(&self, case_id: &CaseId) -> Result<Option<LedgerEntry>, RepositoryError>;

    /// Append `entry` if the case head is still `expected_head`
    fn append(&self, entry: LedgerEntry, expected_head: Option<&AssessmentId>) -> Result<(), RepositoryError>;

    /// Oldest first
    fn history(&self, case_id: &CaseId) -> Result<Vec<LedgerEntry>, RepositoryError>;
}

/// Whether `entry` may extend `chain` given the head the caller read
fn check_append(
    chain: &[LedgerEntry],
    entry: &LedgerEntry,
    expected_head: Option<&AssessmentId>,
) -> Result<(), RepositoryError> {
    let current = chain.last().map(|e| &e.assessment.id);
    if current != expected_head {
        log::warn!(
            "Ledger head for case {} moved: expected {:?}, found {:?}",
            entry.assessment.case_id,
            expected_head,
            current
        );
        return Err(RepositoryError::Conflict);
    }
    if entry.assessment.supersedes.as_ref() != expected_head {
        return Err(RepositoryError::Unavailable(format!(
            "assessment {} does not supersede the case head",
            entry.assessment.id
        )));
    }
    log::info!(
        "Case {} now assessed by {} from {}",
        entry.assessment.case_id,
        entry.assessment.id,
        entry.assessment.effective_from
    );
    Ok(())
}

// ============================================================================
// In memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryAssessmentLedger {
    chains: Mutex<BTreeMap<CaseId, Vec<LedgerEntry>>>,
}

impl MemoryAssessmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<CaseId, Vec<LedgerEntry>>>, RepositoryError> {
        self.chains
            .lock()
            .map_err(|_| RepositoryError::Unavailable("assessment ledger lock poisoned".to_string()))
    }
}

impl AssessmentLedger for MemoryAssessmentLedger {
    fn head(&self, case_id: &CaseId) -> Result<Option<LedgerEntry>, RepositoryError> {
        Ok(self.lock()?.get(case_id).and_then(|chain| chain.last().cloned()))
    }

    fn append(&self, entry: LedgerEntry, expected_head: Option<&AssessmentId>) -> Result<(), RepositoryError> {
        let mut chains = self.lock()?;
        let chain = chains.entry(entry.assessment.case_id.clone()).or_default();
        check_append(chain, &entry, expected_head)?;
        chain.push(entry);
        Ok(())
    }

    fn history(&self, case_id: &CaseId) -> Result<Vec<LedgerEntry>, RepositoryError> {
        Ok(self.lock()?.get(case_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// JSON files
// ============================================================================

/// One JSON file per case holding its whole chain, oldest first.
///
/// An append rewrites the chain through a temporary file and a rename, so
/// the head on disk is always a complete chain.
#[derive(Debug)]
pub struct JsonFileAssessmentLedger {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileAssessmentLedger {
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

    fn chain(&self, case_id: &CaseId) -> Result<Vec<LedgerEntry>, RepositoryError> {
        Ok(read_json::<Vec<LedgerEntry>>(&json_path(&self.dir, &case_id.0))?.unwrap_or_default())
    }
}

impl AssessmentLedger for JsonFileAssessmentLedger {
    fn head(&self, case_id: &CaseId) -> Result<Option<LedgerEntry>, RepositoryError> {
        Ok(self.chain(case_id)?.pop())
    }

    fn append(&self, entry: LedgerEntry, expected_head: Option<&AssessmentId>) -> Result<(), RepositoryError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| RepositoryError::Unavailable("assessment ledger file lock poisoned".to_string()))?;
        let case_id = entry.assessment.case_id.clone();
        let mut chain = self.chain(&case_id)?;
        check_append(&chain, &entry, expected_head)?;
        chain.push(entry);
        write_json(&json_path(&self.dir, &case_id.0), &chain)
    }

    fn history(&self, case_id: &CaseId) -> Result<Vec<LedgerEntry>, RepositoryError> {
        self.chain(case_id)
    }
}
