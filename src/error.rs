//! Error types shared by the rate tables and the assessment pipeline

use crate::case::{CaseId, PartyId};

/// Failure raised while computing an assessment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssessmentError {
    /// Input rejected before any computation (negative income, bad care nights)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The case could not be mapped to a formula
    #[error("unsupported case shape: {0}")]
    UnsupportedCaseShape(String),

    /// Self-referencing or unbacked multi-case links
    #[error("invalid case graph: {0}")]
    InvalidCaseGraph(String),

    /// No schedule published for the requested year or date
    #[error("no rate schedule published for {0}")]
    RatesUnavailable(String),

    /// A court order or binding agreement governs the case
    #[error("case {case} is governed by an active {kind}")]
    BindingDeterminationActive { case: CaseId, kind: String },

    /// Parent resides where income cannot be reported and no deemed income was given
    #[error("deemed income required for parent {0}")]
    DeemedIncomeRequired(PartyId),
}

pub type AssessmentResult<T> = Result<T, AssessmentError>;

/// Failure raised while loading or publishing rate schedules
#[derive(Debug, thiserror::Error)]
pub enum RatesError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid rate table: {0}")]
    Invalid(String),

    #[error("a schedule for financial year {0} is already published")]
    DuplicateYear(u16),
}
