//! Change-of-assessment applications, evidence and lifecycle states

use crate::assessment::{AssessmentId, AssessmentOverrides};
use crate::case::{CaseId, PartyId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Reason codes
// ============================================================================

/// Statutory grounds for changing an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    HighCostsOfContact,
    SpecialNeeds,
    EducationCosts,
    ChildsIncomeOrResources,
    PropertySettlement,
    HighCostsOfCareToEnableWorkOrStudy,
    CommitmentsReducingCapacity,
    IncomeOrFinancialResourcesNotReflected,
    EarningCapacity,
    DutyToMaintainAnother,
    SpecialCircumstances,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 11] = [
        ReasonCode::HighCostsOfContact,
        ReasonCode::SpecialNeeds,
        ReasonCode::EducationCosts,
        ReasonCode::ChildsIncomeOrResources,
        ReasonCode::PropertySettlement,
        ReasonCode::HighCostsOfCareToEnableWorkOrStudy,
        ReasonCode::CommitmentsReducingCapacity,
        ReasonCode::IncomeOrFinancialResourcesNotReflected,
        ReasonCode::EarningCapacity,
        ReasonCode::DutyToMaintainAnother,
        ReasonCode::SpecialCircumstances,
    ];

    /// Reason number as published ("1" to "10", with "8A" and "8B")
    pub const fn number(self) -> &'static str {
        match self {
            ReasonCode::HighCostsOfContact => "1",
            ReasonCode::SpecialNeeds => "2",
            ReasonCode::EducationCosts => "3",
            ReasonCode::ChildsIncomeOrResources => "4",
            ReasonCode::PropertySettlement => "5",
            ReasonCode::HighCostsOfCareToEnableWorkOrStudy => "6",
            ReasonCode::CommitmentsReducingCapacity => "7",
            ReasonCode::IncomeOrFinancialResourcesNotReflected => "8A",
            ReasonCode::EarningCapacity => "8B",
            ReasonCode::DutyToMaintainAnother => "9",
            ReasonCode::SpecialCircumstances => "10",
        }
    }

    /// Guide reference, 5.2.1 to 5.2.11
    pub const fn official_code(self) -> &'static str {
        match self {
            ReasonCode::HighCostsOfContact => "5.2.1",
            ReasonCode::SpecialNeeds => "5.2.2",
            ReasonCode::EducationCosts => "5.2.3",
            ReasonCode::ChildsIncomeOrResources => "5.2.4",
            ReasonCode::PropertySettlement => "5.2.5",
            ReasonCode::HighCostsOfCareToEnableWorkOrStudy => "5.2.6",
            ReasonCode::CommitmentsReducingCapacity => "5.2.7",
            ReasonCode::IncomeOrFinancialResourcesNotReflected => "5.2.8",
            ReasonCode::EarningCapacity => "5.2.9",
            ReasonCode::DutyToMaintainAnother => "5.2.10",
            ReasonCode::SpecialCircumstances => "5.2.11",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ReasonCode::HighCostsOfContact => "high costs of contact",
            ReasonCode::SpecialNeeds => "special needs care costs",
            ReasonCode::EducationCosts => "high costs of caring for or educating a child",
            ReasonCode::ChildsIncomeOrResources => "child's income or resources",
            ReasonCode::PropertySettlement => "property settlement affects capacity",
            ReasonCode::HighCostsOfCareToEnableWorkOrStudy => "high childcare costs",
            ReasonCode::CommitmentsReducingCapacity => "commitments reducing capacity",
            ReasonCode::IncomeOrFinancialResourcesNotReflected => "income, property or resources not reflected",
            ReasonCode::EarningCapacity => "earning capacity",
            ReasonCode::DutyToMaintainAnother => "duty to maintain another person",
            ReasonCode::SpecialCircumstances => "other special circumstances",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reason {} ({})", self.number(), self.label())
    }
}

// ============================================================================
// Evidence
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(pub String);

impl EvidenceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Why a parent's income fell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionCause {
    Resignation,
    ReducedHours,
    Redundancy,
    Illness,
    CaringResponsibilities,
}

impl ReductionCause {
    /// Causes within the parent's own choosing
    pub fn is_voluntary(self) -> bool {
        matches!(self, ReductionCause::Resignation | ReductionCause::ReducedHours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Contact,
    SpecialNeeds,
    Education,
    Childcare,
    PropertySettlement,
    Commitments,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceKind {
    /// A parent's income before and after a drop
    IncomeReduction {
        party: PartyId,
        previous_income: Decimal,
        current_income: Decimal,
        changed_on: NaiveDate,
        cause: ReductionCause,
    },
    /// A parent started living with a new partner
    NewRelationship {
        party: PartyId,
        started_on: NaiveDate,
        /// Recorded when supplied, never used in a computation
        #[serde(default)]
        partner_income: Option<Decimal>,
    },
    /// Income or resources the assessment does not capture
    UndisclosedIncome {
        party: PartyId,
        annual_amount: Decimal,
        substantiated: bool,
    },
    Expense {
        category: ExpenseCategory,
        annual_amount: Decimal,
        substantiated: bool,
    },
    ChildResources {
        annual_amount: Decimal,
        substantiated: bool,
    },
    /// Support paid to a person the parent has a legal duty to maintain
    DependantSupport {
        annual_amount: Decimal,
        substantiated: bool,
    },
    Statement {
        text: String,
    },
}

impl EvidenceKind {
    pub fn label(&self) -> &'static str {
        match self {
            EvidenceKind::IncomeReduction { .. } => "income_reduction",
            EvidenceKind::NewRelationship { .. } => "new_relationship",
            EvidenceKind::UndisclosedIncome { .. } => "undisclosed_income",
            EvidenceKind::Expense { .. } => "expense",
            EvidenceKind::ChildResources { .. } => "child_resources",
            EvidenceKind::DependantSupport { .. } => "dependant_support",
            EvidenceKind::Statement { .. } => "statement",
        }
    }
}

/// One item of evidence; resubmitting the same id has no effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub submitted_by: PartyId,
    pub received_on: NaiveDate,
    #[serde(flatten)]
    pub kind: EvidenceKind,
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Accepted,
    PartiallyAccepted,
    Rejected { reason: String },
}

impl DecisionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionOutcome::Accepted => "accepted",
            DecisionOutcome::PartiallyAccepted => "partially_accepted",
            DecisionOutcome::Rejected { .. } => "rejected",
        }
    }

    pub fn changes_assessment(&self) -> bool {
        !matches!(self, DecisionOutcome::Rejected { .. })
    }
}

/// Result of deciding an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: DecisionOutcome,
    pub findings: Vec<String>,
    pub decided_on: NaiveDate,
    /// Set when the decision produced a new assessment
    pub date_of_effect: Option<NaiveDate>,
    /// The new assessment, or the confirmed one on rejection
    pub assessment: AssessmentId,
    pub overrides: AssessmentOverrides,
}

impl Decision {
    pub fn summary(&self) -> String {
        match &self.outcome {
            DecisionOutcome::Rejected { reason } => {
                format!("rejected: {reason}; assessment {} confirmed", self.assessment)
            }
            outcome => match self.date_of_effect {
                Some(date) => format!("{} from {date}: new assessment {}", outcome.label(), self.assessment),
                None => format!("{}: assessment {}", outcome.label(), self.assessment),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplicationStatus {
    Lodged,
    AwaitingEvidence { missing: Vec<String>, deadline: NaiveDate },
    UnderAssessment,
    Decided { outcome: DecisionOutcome },
    ObjectionWindow { closes_on: NaiveDate },
    Final,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Lodged => "lodged",
            ApplicationStatus::AwaitingEvidence { .. } => "awaiting_evidence",
            ApplicationStatus::UnderAssessment => "under_assessment",
            ApplicationStatus::Decided { .. } => "decided",
            ApplicationStatus::ObjectionWindow { .. } => "objection_window",
            ApplicationStatus::Final => "final",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Final | ApplicationStatus::Withdrawn)
    }

    /// States in which evidence may still be added or the application withdrawn
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Lodged
                | ApplicationStatus::AwaitingEvidence { .. }
                | ApplicationStatus::UnderAssessment
        )
    }
}

/// Request from a party to change the assessment of a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRequest {
    pub case_id: CaseId,
    pub applicant: PartyId,
    pub reason: ReasonCode,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub requested_date_of_effect: NaiveDate,
    /// Leave to reach back beyond the ordinary retrospective limit
    #[serde(default)]
    pub leave_granted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objection {
    pub party: PartyId,
    pub lodged_on: NaiveDate,
    pub grounds: String,
}

/// Persisted application; `version` increases with every stored change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub case_id: CaseId,
    pub applicant: PartyId,
    pub reason: ReasonCode,
    pub lodged_on: NaiveDate,
    pub requested_date_of_effect: NaiveDate,
    pub date_of_effect: NaiveDate,
    pub leave_granted: bool,
    pub status: ApplicationStatus,
    pub evidence: Vec<Evidence>,
    pub decision: Option<Decision>,
    /// Decisions set aside by an objection
    #[serde(default)]
    pub previous_decisions: Vec<Decision>,
    #[serde(default)]
    pub objections: Vec<Objection>,
    pub version: u64,
}

impl ApplicationRecord {
    pub fn has_evidence(&self, id: &EvidenceId) -> bool {
        self.evidence.iter().any(|e| &e.id == id)
    }

    pub fn decision_rationale(&self) -> String {
        match &self.decision {
            Some(decision) => decision.summary(),
            None => "pending decision".to_string(),
        }
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        let (missing_evidence, evidence_deadline) = match &self.status {
            ApplicationStatus::AwaitingEvidence { missing, deadline } => (missing.clone(), Some(*deadline)),
            _ => (Vec::new(), None),
        };
        ApplicationStatusView {
            application_id: self.id.clone(),
            case_id: self.case_id.clone(),
            reason: self.reason,
            status: self.status.label(),
            version: self.version,
            missing_evidence,
            evidence_deadline,
            decision_rationale: self.decision_rationale(),
            assessment: self.decision.as_ref().map(|d| d.assessment.clone()),
        }
    }
}

/// What a caller is told about an application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub case_id: CaseId,
    pub reason: ReasonCode,
    pub status: &'static str,
    pub version: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_evidence: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_deadline: Option<NaiveDate>,
    pub decision_rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<AssessmentId>,
}
