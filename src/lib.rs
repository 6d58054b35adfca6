//! Child Support System - formula assessment engine with a change-of-assessment workflow
//!
//! This library provides:
//! - Versioned rate schedules loaded from data files
//! - Case snapshots with validation
//! - Formula assessment across sole, shared and non-parent care
//! - Multi-case, minimum and fixed rate adjustments
//! - Change-of-assessment applications with evidence, decision and objection

pub mod assessment;
pub mod case;
pub mod change_of_assessment;
pub mod error;
pub mod money;
pub mod rates;

// Re-export commonly used types
pub use assessment::{Assessment, AssessmentCalculator, AssessmentOverrides, Formula};
pub use case::{CaseId, CaseSnapshot, PartyId};
pub use change_of_assessment::{ChangeOfAssessmentService, ReasonCode, ReviewConfig};
pub use error::{AssessmentError, RatesError};
pub use rates::{RateRegistry, RateSchedule};
