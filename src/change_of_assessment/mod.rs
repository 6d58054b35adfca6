//! Change-of-assessment applications
//!
//! A party asks for the formula result to be varied on one of the
//! prescribed reasons. Applications move through lodgement, evidence,
//! decision and objection; an accepted decision supersedes the case's
//! assessment from its date of effect.

pub mod config;
pub mod domain;
pub mod ledger;
pub mod repository;
pub mod rules;
mod service;

pub use config::ReviewConfig;
pub use domain::{
    ApplicationId, ApplicationRecord, ApplicationRequest, ApplicationStatus, ApplicationStatusView,
    Decision, DecisionOutcome, Evidence, EvidenceId, EvidenceKind, ExpenseCategory, Objection,
    ReasonCode, ReductionCause,
};
pub use ledger::{AssessmentLedger, JsonFileAssessmentLedger, LedgerEntry, MemoryAssessmentLedger};
pub use repository::{
    ApplicationRepository, JsonFileApplicationRepository, MemoryApplicationRepository,
    RepositoryError,
};
pub use service::{ChangeOfAssessmentService, WorkflowError};
