//! Change-of-assessment workflow
//!
//! Each operation reads the stored application, applies one transition and
//! writes it back at the version it read. Transitions triggered by events
//! (evidence, timers, objections) retry on a stale read and are no-ops when
//! already applied, so callers may repeat them freely. Decisions take the
//! version the decider looked at and fail if the application moved on.

use super::config::ReviewConfig;
use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationRequest, ApplicationStatus, ApplicationStatusView,
    Decision, Evidence, Objection,
};
use super::ledger::{AssessmentLedger, LedgerEntry};
use super::repository::{ApplicationRepository, RepositoryError};
use super::rules::{self, Evaluation, EvaluationContext};
use crate::assessment::{validate_portfolio, Assessment, AssessmentCalculator, AssessmentOverrides};
use crate::case::{CaseId, CaseSnapshot, PartyId};
use crate::error::AssessmentError;
use chrono::NaiveDate;
use std::sync::Arc;

const MAX_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error("insufficient evidence: missing {}", .missing.join(", "))]
    InsufficientEvidence { missing: Vec<String> },
    #[error("application {id} is at version {actual}, not {expected}")]
    VersionConflict { id: ApplicationId, expected: u64, actual: u64 },
    #[error("cannot {action} application {id} while it is {status}")]
    InvalidTransition {
        id: ApplicationId,
        status: &'static str,
        action: &'static str,
    },
    #[error("no assessment recorded for case {0}")]
    NoAssessment(CaseId),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Service composing the application store, the assessment ledger and the calculator
pub struct ChangeOfAssessmentService<R, L> {
    repository: Arc<R>,
    ledger: Arc<L>,
    calculator: Arc<AssessmentCalculator>,
    config: ReviewConfig,
}

impl<R, L> ChangeOfAssessmentService<R, L>
where
    R: ApplicationRepository + 'static,
    L: AssessmentLedger + 'static,
{
    pub fn new(
        repository: Arc<R>,
        ledger: Arc<L>,
        calculator: Arc<AssessmentCalculator>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            repository,
            ledger,
            calculator,
            config,
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Assessments
    // ------------------------------------------------------------------------

    /// Assess a case for the first time and record it as the case head.
    ///
    /// Other-case links are checked against every linked case already on
    /// the ledger.
    pub fn open_case(&self, snapshot: &CaseSnapshot) -> Result<Assessment, WorkflowError> {
        if self.ledger.head(&snapshot.case.id)?.is_some() {
            return Err(WorkflowError::InvalidRequest(format!(
                "case {} already has an assessment",
                snapshot.case.id
            )));
        }
        let mut portfolio = vec![snapshot.case.clone()];
        for parent in snapshot.case.parents() {
            for link in &parent.other_cases {
                if portfolio.iter().any(|c| c.id == link.case_id) {
                    continue;
                }
                if let Some(linked) = self.ledger.head(&link.case_id)? {
                    portfolio.push(linked.snapshot.case);
                }
            }
        }
        validate_portfolio(&portfolio)?;

        let assessment = self.calculator.assess(snapshot)?;
        self.ledger.append(
            LedgerEntry {
                assessment: assessment.clone(),
                snapshot: snapshot.clone(),
                overrides: AssessmentOverrides::default(),
                source: None,
            },
            None,
        )?;
        Ok(assessment)
    }

    pub fn current_assessment(&self, case_id: &CaseId) -> Result<Assessment, WorkflowError> {
        Ok(self.head(case_id)?.assessment)
    }

    fn head(&self, case_id: &CaseId) -> Result<LedgerEntry, WorkflowError> {
        self.ledger
            .head(case_id)?
            .ok_or_else(|| WorkflowError::NoAssessment(case_id.clone()))
    }

    fn predecessor(&self, entry: &LedgerEntry) -> Result<LedgerEntry, WorkflowError> {
        let case_id = &entry.assessment.case_id;
        let Some(previous) = &entry.assessment.supersedes else {
            return Err(WorkflowError::NoAssessment(case_id.clone()));
        };
        self.ledger
            .history(case_id)?
            .into_iter()
            .find(|e| &e.assessment.id == previous)
            .ok_or_else(|| WorkflowError::NoAssessment(case_id.clone()))
    }

    /// Latest ledger entry from `record` that no stored decision of it names
    fn unrecorded_entry(&self, record: &ApplicationRecord) -> Result<Option<LedgerEntry>, WorkflowError> {
        Ok(self.ledger.history(&record.case_id)?.into_iter().rev().find(|e| {
            e.source.as_ref() == Some(&record.id)
                && !record
                    .previous_decisions
                    .iter()
                    .any(|d| d.assessment == e.assessment.id)
        }))
    }

    /// The latest entry not produced by `application`
    fn base_before(&self, head: &LedgerEntry, application: &ApplicationId) -> Result<LedgerEntry, WorkflowError> {
        let mut entry = self.predecessor(head)?;
        while entry.source.as_ref() == Some(application) {
            entry = self.predecessor(&entry)?;
        }
        Ok(entry)
    }

    fn require_party(&self, case_id: &CaseId, party: &PartyId) -> Result<(), WorkflowError> {
        let head = self.head(case_id)?;
        if head.snapshot.case.party_ids().contains(party) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidRequest(format!(
                "{party} is not a party to case {case_id}"
            )))
        }
    }

    // ------------------------------------------------------------------------
    // Lodgement and evidence
    // ------------------------------------------------------------------------

    /// Lodge an application. The date of effect is moved forward to the
    /// earliest date the retrospective limit allows.
    pub fn lodge(
        &self,
        request: ApplicationRequest,
        lodged_on: NaiveDate,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let head = self.head(&request.case_id)?;
        if !head.snapshot.case.party_ids().contains(&request.applicant) {
            return Err(WorkflowError::InvalidRequest(format!(
                "{} is not a party to case {}",
                request.applicant, request.case_id
            )));
        }
        if request.requested_date_of_effect > head.assessment.period_end {
            return Err(WorkflowError::InvalidRequest(format!(
                "date of effect {} is after the assessment period ending {}",
                request.requested_date_of_effect, head.assessment.period_end
            )));
        }

        let earliest = self
            .config
            .earliest_date_of_effect(lodged_on, request.leave_granted)
            .ok_or_else(|| WorkflowError::InvalidRequest(format!("lodgement date {lodged_on} out of range")))?;
        let date_of_effect = request
            .requested_date_of_effect
            .max(earliest)
            .max(head.assessment.period_start);
        if date_of_effect > head.assessment.period_end {
            return Err(WorkflowError::InvalidRequest(format!(
                "lodged on {lodged_on}, too late to vary the assessment period ending {}",
                head.assessment.period_end
            )));
        }
        if date_of_effect != request.requested_date_of_effect {
            log::warn!(
                "Date of effect for case {} moved from {} to {}",
                request.case_id,
                request.requested_date_of_effect,
                date_of_effect
            );
        }

        let mut evidence: Vec<Evidence> = Vec::with_capacity(request.evidence.len());
        for item in request.evidence {
            if !evidence.iter().any(|e| e.id == item.id) {
                evidence.push(item);
            }
        }

        for _ in 0..MAX_ATTEMPTS {
            // numbered from the store so a restarted service carries on the sequence
            let sequence = self.repository.next_sequence(&request.case_id)?;
            let record = ApplicationRecord {
                id: ApplicationId(format!("{}-coa-{sequence:04}", request.case_id)),
                case_id: request.case_id.clone(),
                applicant: request.applicant.clone(),
                reason: request.reason,
                lodged_on,
                requested_date_of_effect: request.requested_date_of_effect,
                date_of_effect,
                leave_granted: request.leave_granted,
                status: ApplicationStatus::Lodged,
                evidence: evidence.clone(),
                decision: None,
                previous_decisions: Vec::new(),
                objections: Vec::new(),
                version: 0,
            };
            match self.repository.insert(record) {
                Ok(stored) => {
                    log::info!(
                        "Lodged {} for case {} under {}",
                        stored.id,
                        stored.case_id,
                        stored.reason
                    );
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict) => {
                    log::debug!("Application number {sequence} for case {} taken; retrying", request.case_id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepositoryError::Conflict.into())
    }

    /// Check a lodged application's evidence. Incomplete applications wait
    /// for evidence until the window closes.
    pub fn triage(&self, id: &ApplicationId, today: NaiveDate) -> Result<ApplicationRecord, WorkflowError> {
        self.transition(id, |record| {
            if record.status != ApplicationStatus::Lodged {
                return Ok(None);
            }
            let missing = rules::missing_evidence(record.reason, &record.evidence);
            let mut next = record.clone();
            next.status = if missing.is_empty() {
                ApplicationStatus::UnderAssessment
            } else {
                let deadline = self.config.evidence_deadline(today).ok_or_else(|| {
                    WorkflowError::InvalidRequest(format!("evidence deadline from {today} out of range"))
                })?;
                log::info!("{} awaiting evidence until {deadline}: {}", record.id, missing.join(", "));
                ApplicationStatus::AwaitingEvidence { missing, deadline }
            };
            Ok(Some(next))
        })
    }

    /// Append evidence. Either party may submit at any time before a
    /// decision; an item already on file is ignored.
    pub fn submit_evidence(
        &self,
        id: &ApplicationId,
        evidence: Evidence,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let record = self.load(id)?;
        self.require_party(&record.case_id, &evidence.submitted_by)?;

        self.transition(id, |record| {
            if record.has_evidence(&evidence.id) {
                return Ok(None);
            }
            if !record.status.is_pending() {
                return Err(invalid(record, "submit evidence to"));
            }
            let mut next = record.clone();
            next.evidence.push(evidence.clone());
            if let ApplicationStatus::AwaitingEvidence { deadline, .. } = &record.status {
                let missing = rules::missing_evidence(next.reason, &next.evidence);
                next.status = if missing.is_empty() {
                    ApplicationStatus::UnderAssessment
                } else {
                    ApplicationStatus::AwaitingEvidence { missing, deadline: *deadline }
                };
            }
            Ok(Some(next))
        })
    }

    /// Move an application whose evidence window has closed on to assessment
    /// with the evidence on file
    pub fn expire_evidence_window(
        &self,
        id: &ApplicationId,
        today: NaiveDate,
    ) -> Result<ApplicationRecord, WorkflowError> {
        self.transition(id, |record| match &record.status {
            ApplicationStatus::AwaitingEvidence { deadline, missing } if today > *deadline => {
                log::info!(
                    "Evidence window for {} closed on {deadline}; proceeding without {}",
                    record.id,
                    missing.join(", ")
                );
                let mut next = record.clone();
                next.status = ApplicationStatus::UnderAssessment;
                Ok(Some(next))
            }
            _ => Ok(None),
        })
    }

    // ------------------------------------------------------------------------
    // Decision
    // ------------------------------------------------------------------------

    /// Decide an application read at `expected_version`.
    ///
    /// The application is evaluated against the case assessment in force at
    /// the time, so a second application on the same case sees the outcome
    /// of the first. Repeating a decision that has been made returns it.
    pub fn decide(
        &self,
        id: &ApplicationId,
        expected_version: u64,
        decided_on: NaiveDate,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let record = self.load(id)?;
        if record.decision.is_some() {
            return Ok(record);
        }
        if record.version != expected_version {
            log::warn!(
                "Decision on {} used version {expected_version}, stored version is {}",
                record.id,
                record.version
            );
            return Err(WorkflowError::VersionConflict {
                id: record.id.clone(),
                expected: expected_version,
                actual: record.version,
            });
        }
        match &record.status {
            ApplicationStatus::UnderAssessment => {}
            ApplicationStatus::AwaitingEvidence { missing, .. } => {
                return Err(WorkflowError::InsufficientEvidence {
                    missing: missing.clone(),
                });
            }
            _ => return Err(invalid(&record, "decide")),
        }

        let decision = self.resolve(&record, decided_on)?;
        log::info!("Decided {}: {}", record.id, decision.summary());

        let mut next = record.clone();
        next.status = ApplicationStatus::Decided {
            outcome: decision.outcome.clone(),
        };
        next.decision = Some(decision);
        self.store(next, expected_version)
    }

    fn evaluate(&self, record: &ApplicationRecord, current: &Assessment) -> Evaluation {
        rules::evaluate(&EvaluationContext {
            reason: record.reason,
            applicant: &record.applicant,
            evidence: &record.evidence,
            current,
            config: &self.config,
        })
    }

    /// Evaluate against the ledger head and append any new assessment,
    /// retrying if another decision moves the head first.
    ///
    /// An entry this application already put on the ledger is kept only if
    /// it carries exactly the adjustments this evaluation arrives at. Such an
    /// entry comes from an earlier attempt whose decision was not stored, or
    /// from a decision set aside on objection. Otherwise a corrected
    /// assessment supersedes it when it is still the head, and the decision
    /// is refused when a later assessment already builds on it.
    fn resolve(&self, record: &ApplicationRecord, decided_on: NaiveDate) -> Result<Decision, WorkflowError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let head = self.head(&record.case_id)?;
            let own_head = head.source.as_ref() == Some(&record.id);
            let own = if own_head {
                Some(head.clone())
            } else {
                self.unrecorded_entry(record)?
            };

            // the entry this application is measured against, excluding its own effect
            let base = match &own {
                Some(entry) => self.base_before(entry, &record.id)?,
                None => {
                    if let Some(previous) = record.previous_decisions.last() {
                        if previous.date_of_effect.is_some() {
                            return Err(WorkflowError::InvalidRequest(format!(
                                "assessment {} has since been superseded; lodge a fresh application",
                                previous.assessment
                            )));
                        }
                    }
                    head.clone()
                }
            };

            let evaluation = self.evaluate(record, &base.assessment);

            let overrides = if evaluation.outcome.changes_assessment() {
                base.overrides.merge(&evaluation.overrides)
            } else if own.is_some() {
                // this application's earlier change no longer stands
                base.overrides.clone()
            } else {
                return Ok(Decision {
                    outcome: evaluation.outcome,
                    findings: evaluation.findings,
                    decided_on,
                    date_of_effect: None,
                    assessment: head.assessment.id.clone(),
                    overrides: AssessmentOverrides::default(),
                });
            };

            if let Some(entry) = own {
                if overrides == entry.overrides {
                    log::debug!("{} confirms assessment {}", record.id, entry.assessment.id);
                    return Ok(Decision {
                        outcome: evaluation.outcome,
                        findings: evaluation.findings,
                        decided_on,
                        date_of_effect: Some(entry.assessment.effective_from),
                        assessment: entry.assessment.id,
                        overrides: evaluation.overrides,
                    });
                }
                if !own_head {
                    return Err(WorkflowError::InvalidRequest(format!(
                        "assessment {} from {} has since been superseded; lodge a fresh application",
                        entry.assessment.id, record.id
                    )));
                }
            }

            let effective_from = record.date_of_effect.max(head.assessment.effective_from);
            let assessment = self.calculator.reassess(
                &head.assessment,
                &base.snapshot,
                &overrides,
                effective_from,
            )?;
            let entry = LedgerEntry {
                assessment: assessment.clone(),
                snapshot: base.snapshot.clone(),
                overrides,
                source: Some(record.id.clone()),
            };
            match self.ledger.append(entry, Some(&head.assessment.id)) {
                Ok(()) => {
                    return Ok(Decision {
                        outcome: evaluation.outcome,
                        findings: evaluation.findings,
                        decided_on,
                        date_of_effect: Some(effective_from),
                        assessment: assessment.id,
                        overrides: evaluation.overrides,
                    });
                }
                Err(RepositoryError::Conflict) => {
                    log::warn!(
                        "Case {} head moved while deciding {} (attempt {attempt}); re-evaluating",
                        record.case_id,
                        record.id
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepositoryError::Conflict.into())
    }

    // ------------------------------------------------------------------------
    // Objections
    // ------------------------------------------------------------------------

    pub fn open_objection_window(
        &self,
        id: &ApplicationId,
        opened_on: NaiveDate,
    ) -> Result<ApplicationRecord, WorkflowError> {
        self.transition(id, |record| match &record.status {
            ApplicationStatus::Decided { .. } => {
                let closes_on = self.config.objection_deadline(opened_on).ok_or_else(|| {
                    WorkflowError::InvalidRequest(format!("objection deadline from {opened_on} out of range"))
                })?;
                let mut next = record.clone();
                next.status = ApplicationStatus::ObjectionWindow { closes_on };
                Ok(Some(next))
            }
            ApplicationStatus::ObjectionWindow { .. } | ApplicationStatus::Final => Ok(None),
            _ => Err(invalid(record, "open the objection window of")),
        })
    }

    /// Object to a decision. The decision is set aside and the application
    /// goes back for assessment.
    pub fn lodge_objection(
        &self,
        id: &ApplicationId,
        objection: Objection,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let record = self.load(id)?;
        self.require_party(&record.case_id, &objection.party)?;

        self.transition(id, |record| {
            if record.objections.contains(&objection) {
                return Ok(None);
            }
            let ApplicationStatus::ObjectionWindow { closes_on } = &record.status else {
                return Err(invalid(record, "object to"));
            };
            if objection.lodged_on > *closes_on {
                return Err(WorkflowError::InvalidRequest(format!(
                    "objection period for {} closed on {closes_on}",
                    record.id
                )));
            }
            log::info!("{} objected to the decision on {}", objection.party, record.id);
            let mut next = record.clone();
            if let Some(decision) = next.decision.take() {
                next.previous_decisions.push(decision);
            }
            next.objections.push(objection.clone());
            next.status = ApplicationStatus::UnderAssessment;
            Ok(Some(next))
        })
    }

    /// Make the decision final once the objection window has passed
    pub fn close_objection_window(
        &self,
        id: &ApplicationId,
        today: NaiveDate,
    ) -> Result<ApplicationRecord, WorkflowError> {
        self.transition(id, |record| match &record.status {
            ApplicationStatus::ObjectionWindow { closes_on } if today > *closes_on => {
                let mut next = record.clone();
                next.status = ApplicationStatus::Final;
                log::info!("{} is final", record.id);
                Ok(Some(next))
            }
            ApplicationStatus::ObjectionWindow { .. } | ApplicationStatus::Final => Ok(None),
            _ => Err(invalid(record, "close the objection window of")),
        })
    }

    /// Withdraw an undecided application; only the applicant may
    pub fn withdraw(&self, id: &ApplicationId, party: &PartyId) -> Result<ApplicationRecord, WorkflowError> {
        self.transition(id, |record| {
            if record.status == ApplicationStatus::Withdrawn {
                return Ok(None);
            }
            if &record.applicant != party {
                return Err(WorkflowError::InvalidRequest(format!(
                    "only {} may withdraw {}",
                    record.applicant, record.id
                )));
            }
            if !record.status.is_pending() {
                return Err(invalid(record, "withdraw"));
            }
            let mut next = record.clone();
            next.status = ApplicationStatus::Withdrawn;
            Ok(Some(next))
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        self.load(id)
    }

    pub fn status(&self, id: &ApplicationId) -> Result<ApplicationStatusView, WorkflowError> {
        Ok(self.load(id)?.status_view())
    }

    pub fn pending(&self, limit: usize) -> Result<Vec<ApplicationRecord>, WorkflowError> {
        Ok(self.repository.pending(limit)?)
    }

    // ------------------------------------------------------------------------
    // Storage helpers
    // ------------------------------------------------------------------------

    fn load(&self, id: &ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        Ok(self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)?)
    }

    fn store(&self, record: ApplicationRecord, expected: u64) -> Result<ApplicationRecord, WorkflowError> {
        let id = record.id.clone();
        match self.repository.update(record, expected) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::StaleVersion { expected, actual }) => {
                Err(WorkflowError::VersionConflict { id, expected, actual })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `step` to the latest stored record, re-reading on a stale write.
    /// `step` returns `None` when there is nothing to change.
    fn transition<F>(&self, id: &ApplicationId, step: F) -> Result<ApplicationRecord, WorkflowError>
    where
        F: Fn(&ApplicationRecord) -> Result<Option<ApplicationRecord>, WorkflowError>,
    {
        for _ in 0..MAX_ATTEMPTS {
            let record = self.load(id)?;
            let Some(next) = step(&record)? else {
                return Ok(record);
            };
            match self.store(next, record.version) {
                Err(WorkflowError::VersionConflict { .. }) => {
                    log::debug!("{id} changed underneath a transition; retrying");
                }
                result => return result,
            }
        }
        Err(RepositoryError::Conflict.into())
    }
}

fn invalid(record: &ApplicationRecord, action: &'static str) -> WorkflowError {
    WorkflowError::InvalidTransition {
        id: record.id.clone(),
        status: record.status.label(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::fixtures::{child, date, two_parent_snapshot};
    use crate::case::{OtherCase, OtherCaseChild};
    use crate::change_of_assessment::domain::{
        DecisionOutcome, EvidenceId, EvidenceKind, ExpenseCategory, ReasonCode, ReductionCause,
    };
    use crate::change_of_assessment::ledger::MemoryAssessmentLedger;
    use crate::change_of_assessment::repository::MemoryApplicationRepository;
    use crate::rates::fixtures::bundled_registry;
    use rust_decimal_macros::dec;

    type Service = ChangeOfAssessmentService<MemoryApplicationRepository, MemoryAssessmentLedger>;

    fn empty_service() -> Service {
        let calculator = Arc::new(AssessmentCalculator::new(Arc::new(bundled_registry())));
        ChangeOfAssessmentService::new(
            Arc::new(MemoryApplicationRepository::new()),
            Arc::new(MemoryAssessmentLedger::new()),
            calculator,
            ReviewConfig::default(),
        )
    }

    fn service() -> (Service, CaseSnapshot) {
        let service = empty_service();
        let snapshot = two_parent_snapshot(80000, 50000, 0, 365);
        service.open_case(&snapshot).unwrap();
        (service, snapshot)
    }

    fn item(id: &str, by: &str, kind: EvidenceKind) -> Evidence {
        Evidence {
            id: EvidenceId::new(id),
            submitted_by: PartyId::new(by),
            received_on: date(2026, 3, 1),
            kind,
        }
    }

    fn school_fees(id: &str, amount: rust_decimal::Decimal) -> Evidence {
        item(id, "B", EvidenceKind::Expense {
            category: ExpenseCategory::Education,
            annual_amount: amount,
            substantiated: true,
        })
    }

    fn request(reason: ReasonCode, evidence: Vec<Evidence>) -> ApplicationRequest {
        ApplicationRequest {
            case_id: CaseId::new("C-1"),
            applicant: PartyId::new("B"),
            reason,
            evidence,
            requested_date_of_effect: date(2026, 3, 1),
            leave_granted: false,
        }
    }

    #[test]
    fn test_accepted_application_supersedes_assessment() {
        let (service, snapshot) = service();
        let before = service.current_assessment(&snapshot.case.id).unwrap();

        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, vec![school_fees("fees", dec!(14000))]), date(2026, 3, 1))
            .unwrap();
        let triaged = service.triage(&lodged.id, date(2026, 3, 1)).unwrap();
        assert_eq!(triaged.status, ApplicationStatus::UnderAssessment);

        let decided = service.decide(&lodged.id, triaged.version, date(2026, 3, 10)).unwrap();
        let decision = decided.decision.clone().unwrap();
        assert_eq!(decision.outcome, DecisionOutcome::Accepted);

        let after = service.current_assessment(&snapshot.case.id).unwrap();
        assert_eq!(after.id, decision.assessment);
        assert_eq!(after.supersedes, Some(before.id.clone()));
        assert_eq!(after.effective_from, date(2026, 3, 1));
        assert_eq!(after.cost_of_children_adjustment, dec!(14000));
        assert!(after.annual_liability > before.annual_liability);
        assert_eq!(service.status(&lodged.id).unwrap().assessment, Some(after.id));
    }

    #[test]
    fn test_decide_is_idempotent() {
        let (service, _) = service();
        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, vec![school_fees("fees", dec!(14000))]), date(2026, 3, 1))
            .unwrap();
        let triaged = service.triage(&lodged.id, date(2026, 3, 1)).unwrap();
        let first = service.decide(&lodged.id, triaged.version, date(2026, 3, 10)).unwrap();
        let again = service.decide(&lodged.id, triaged.version, date(2026, 3, 11)).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_stale_decision_rejected() {
        let (service, _) = service();
        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, vec![school_fees("fees", dec!(14000))]), date(2026, 3, 1))
            .unwrap();
        let triaged = service.triage(&lodged.id, date(2026, 3, 1)).unwrap();
        service
            .submit_evidence(&lodged.id, school_fees("uniforms", dec!(900)))
            .unwrap();

        match service.decide(&lodged.id, triaged.version, date(2026, 3, 10)) {
            Err(WorkflowError::VersionConflict { expected, actual, .. }) => {
                assert_eq!(expected, triaged.version);
                assert_eq!(actual, triaged.version + 1);
            }
            other => panic!("expected version conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_evidence_resubmission_is_ignored() {
        let (service, _) = service();
        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, Vec::new()), date(2026, 3, 1))
            .unwrap();
        let first = service.submit_evidence(&lodged.id, school_fees("fees", dec!(14000))).unwrap();
        let second = service.submit_evidence(&lodged.id, school_fees("fees", dec!(14000))).unwrap();
        assert_eq!(first.version, second.version);
        assert_eq!(second.evidence.len(), 1);
    }

    #[test]
    fn test_awaiting_evidence_then_complete() {
        let (service, _) = service();
        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, Vec::new()), date(2026, 3, 1))
            .unwrap();
        let triaged = service.triage(&lodged.id, date(2026, 3, 1)).unwrap();
        assert_eq!(
            triaged.status,
            ApplicationStatus::AwaitingEvidence {
                missing: vec!["expense:education".to_string()],
                deadline: date(2026, 3, 29),
            }
        );
        match service.decide(&lodged.id, triaged.version, date(2026, 3, 2)) {
            Err(WorkflowError::InsufficientEvidence { missing }) => {
                assert_eq!(missing, vec!["expense:education".to_string()])
            }
            other => panic!("expected insufficient evidence, got {other:?}"),
        }

        let completed = service.submit_evidence(&lodged.id, school_fees("fees", dec!(14000))).unwrap();
        assert_eq!(completed.status, ApplicationStatus::UnderAssessment);
    }

    #[test]
    fn test_evidence_window_only_expires_after_deadline() {
        let (service, _) = service();
        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, Vec::new()), date(2026, 3, 1))
            .unwrap();
        service.triage(&lodged.id, date(2026, 3, 1)).unwrap();

        let early = service.expire_evidence_window(&lodged.id, date(2026, 3, 29)).unwrap();
        assert_eq!(early.status.label(), "awaiting_evidence");
        let expired = service.expire_evidence_window(&lodged.id, date(2026, 3, 30)).unwrap();
        assert_eq!(expired.status, ApplicationStatus::UnderAssessment);

        let decided = service.decide(&lodged.id, expired.version, date(2026, 4, 1)).unwrap();
        assert!(matches!(
            decided.status,
            ApplicationStatus::Decided { outcome: DecisionOutcome::Rejected { .. } }
        ));
    }

    #[test]
    fn test_date_of_effect_limited_to_eighteen_months() {
        let (service, _) = service();
        let mut late = request(ReasonCode::EducationCosts, Vec::new());
        late.requested_date_of_effect = date(2026, 1, 1);
        let lodged = service.lodge(late, date(2027, 9, 1)).unwrap();
        assert_eq!(lodged.date_of_effect, date(2026, 3, 1));
        assert_eq!(lodged.requested_date_of_effect, date(2026, 1, 1));

        let mut beyond = request(ReasonCode::EducationCosts, Vec::new());
        beyond.requested_date_of_effect = date(2027, 1, 5);
        assert!(matches!(
            service.lodge(beyond, date(2026, 3, 1)),
            Err(WorkflowError::InvalidRequest(_))
        ));

        let mut early = request(ReasonCode::EducationCosts, Vec::new());
        early.requested_date_of_effect = date(2025, 6, 1);
        let lodged = service.lodge(early, date(2026, 3, 1)).unwrap();
        // the assessment only starts on 1 January 2026
        assert_eq!(lodged.date_of_effect, date(2026, 1, 1));
    }

    #[test]
    fn test_objection_cycle_reaches_final() {
        let (service, snapshot) = service();
        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, vec![school_fees("fees", dec!(14000))]), date(2026, 3, 1))
            .unwrap();
        let triaged = service.triage(&lodged.id, date(2026, 3, 1)).unwrap();
        let decided = service.decide(&lodged.id, triaged.version, date(2026, 3, 10)).unwrap();
        let first_change = decided.decision.unwrap().assessment;
        let window = service.open_objection_window(&lodged.id, date(2026, 3, 10)).unwrap();
        assert_eq!(window.status, ApplicationStatus::ObjectionWindow { closes_on: date(2026, 4, 7) });

        let objection = Objection {
            party: PartyId::new("A"),
            lodged_on: date(2026, 3, 20),
            grounds: "fees were never agreed".to_string(),
        };
        let reopened = service.lodge_objection(&lodged.id, objection.clone()).unwrap();
        assert_eq!(reopened.status, ApplicationStatus::UnderAssessment);
        assert_eq!(reopened.previous_decisions.len(), 1);
        assert_eq!(service.lodge_objection(&lodged.id, objection).unwrap().version, reopened.version);

        // reconsidered on the same evidence: accepted again, still one change in force
        let redecided = service.decide(&lodged.id, reopened.version, date(2026, 4, 1)).unwrap();
        let head = service.current_assessment(&snapshot.case.id).unwrap();
        assert_eq!(redecided.decision.unwrap().assessment, head.id);
        assert_eq!(head.id, first_change);
        assert_eq!(head.cost_of_children_adjustment, dec!(14000));

        service.open_objection_window(&lodged.id, date(2026, 4, 1)).unwrap();
        let open = service.close_objection_window(&lodged.id, date(2026, 4, 29)).unwrap();
        assert_eq!(open.status.label(), "objection_window");
        let closed = service.close_objection_window(&lodged.id, date(2026, 4, 30)).unwrap();
        assert_eq!(closed.status, ApplicationStatus::Final);
    }

    #[test]
    fn test_withdraw_only_by_applicant_before_decision() {
        let (service, _) = service();
        let lodged = service
            .lodge(request(ReasonCode::EducationCosts, Vec::new()), date(2026, 3, 1))
            .unwrap();
        assert!(matches!(
            service.withdraw(&lodged.id, &PartyId::new("A")),
            Err(WorkflowError::InvalidRequest(_))
        ));
        let withdrawn = service.withdraw(&lodged.id, &PartyId::new("B")).unwrap();
        assert_eq!(withdrawn.status, ApplicationStatus::Withdrawn);
        assert!(service.pending(10).unwrap().is_empty());
        assert!(matches!(
            service.submit_evidence(&lodged.id, school_fees("late", dec!(100))),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_earning_capacity_accepted_uses_reduction_only() {
        let (service, snapshot) = service();
        let before = service.current_assessment(&snapshot.case.id).unwrap();
        let evidence = vec![
            item("rel", "B", EvidenceKind::NewRelationship {
                party: PartyId::new("A"),
                started_on: date(2026, 1, 10),
                partner_income: Some(dec!(300000)),
            }),
            item("cut", "B", EvidenceKind::IncomeReduction {
                party: PartyId::new("A"),
                previous_income: dec!(100000),
                current_income: dec!(80000),
                changed_on: date(2026, 2, 1),
                cause: ReductionCause::ReducedHours,
            }),
        ];
        let lodged = service.lodge(request(ReasonCode::EarningCapacity, evidence), date(2026, 3, 1)).unwrap();
        let triaged = service.triage(&lodged.id, date(2026, 3, 1)).unwrap();
        service.decide(&lodged.id, triaged.version, date(2026, 3, 10)).unwrap();

        let after = service.current_assessment(&snapshot.case.id).unwrap();
        // 100000 - 31046, nothing of the partner's 300000
        assert_eq!(after.child_support_income(&PartyId::new("A")), Some(dec!(68954)));
        assert!(after.annual_liability > before.annual_liability);
    }

    #[test]
    fn test_numbering_continues_across_service_instances() {
        let repository = Arc::new(MemoryApplicationRepository::new());
        let ledger = Arc::new(MemoryAssessmentLedger::new());
        let calculator = Arc::new(AssessmentCalculator::new(Arc::new(bundled_registry())));
        let build = || {
            ChangeOfAssessmentService::new(
                Arc::clone(&repository),
                Arc::clone(&ledger),
                Arc::clone(&calculator),
                ReviewConfig::default(),
            )
        };

        let first = build();
        first.open_case(&two_parent_snapshot(80000, 50000, 0, 365)).unwrap();
        for _ in 0..3 {
            first.lodge(request(ReasonCode::EducationCosts, Vec::new()), date(2026, 3, 1)).unwrap();
        }

        let second = build();
        let lodged = second
            .lodge(request(ReasonCode::EducationCosts, Vec::new()), date(2026, 3, 2))
            .unwrap();
        assert_eq!(lodged.id, ApplicationId::new("C-1-coa-0004"));
        assert_eq!(second.pending(10).unwrap().len(), 4);
    }

    #[test]
    fn test_open_case_checks_links_to_assessed_cases() {
        let (service, _) = service();
        let link = |case_id: &str, other: &str| OtherCase {
            case_id: CaseId::new(case_id),
            other_party: Some(PartyId::new(other)),
            children: vec![OtherCaseChild { date_of_birth: date(2018, 1, 1) }],
        };
        let mut second = two_parent_snapshot(80000, 40000, 0, 365);
        second.case.id = CaseId::new("C-2");
        second.case.parent_b.id = PartyId::new("Q");
        second.case.children = vec![child("k2", date(2020, 1, 1), &[("A", 0), ("Q", 365)])];
        second.case.parent_a.other_cases = vec![link("C-1", "B")];

        // C-1 was opened without any link back to C-2
        match service.open_case(&second) {
            Err(WorkflowError::Assessment(AssessmentError::InvalidCaseGraph(message))) => {
                assert!(message.contains("not reciprocated"), "{message}")
            }
            other => panic!("expected invalid case graph, got {other:?}"),
        }
        assert!(service.current_assessment(&CaseId::new("C-2")).is_err());

        // linked through a parent who is not in C-1
        second.case.parent_a.other_cases.clear();
        second.case.parent_b.other_cases = vec![link("C-1", "B")];
        assert!(matches!(
            service.open_case(&second),
            Err(WorkflowError::Assessment(AssessmentError::InvalidCaseGraph(_)))
        ));

        // a case not yet on the ledger is not checked, and a link back to it is accepted
        let service = empty_service();
        let mut first = two_parent_snapshot(80000, 50000, 0, 365);
        first.case.parent_a.other_cases = vec![link("C-2", "Q")];
        service.open_case(&first).unwrap();
        second.case.parent_b.other_cases.clear();
        second.case.parent_a.other_cases = vec![link("C-1", "B")];
        service.open_case(&second).unwrap();
        assert_eq!(service.current_assessment(&CaseId::new("C-2")).unwrap().case_id, CaseId::new("C-2"));
    }

    #[test]
    fn test_unknown_application() {
        let (service, _) = service();
        assert!(matches!(
            service.get(&ApplicationId::new("nope")),
            Err(WorkflowError::Repository(RepositoryError::NotFound))
        ));
    }
}
