//! Formula selection
//!
//! Every valid case shape maps to exactly one formula. Shapes that fit none
//! of them are reported as unsupported rather than assessed under Formula 1.

use super::care::{care_percentage, round_care};
use crate::case::{AssessmentPeriod, Case};
use crate::error::{AssessmentError, AssessmentResult};
use crate::rates::RateSchedule;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    /// Formula 1: two parents, no other cases
    Standard,
    /// Formula 2: non-parent carer, both parents assessable
    NonParentCarer,
    /// Formula 3: two parents, at least one with other cases
    MultiCase,
    /// Formula 4: non-parent carer, a parent with other cases
    NonParentCarerMultiCase,
    /// Formula 5: non-parent carer, other parent in a non-reporting jurisdiction
    ParentUnavailable,
    /// Formula 6: non-parent carer, other parent deceased
    ParentDeceased,
    /// Two parents, one overseas without standard reporting; deemed income used
    DeemedIncome,
}

impl Formula {
    /// Statutory formula number, if there is one
    pub fn number(&self) -> Option<u8> {
        match self {
            Formula::Standard => Some(1),
            Formula::NonParentCarer => Some(2),
            Formula::MultiCase => Some(3),
            Formula::NonParentCarerMultiCase => Some(4),
            Formula::ParentUnavailable => Some(5),
            Formula::ParentDeceased => Some(6),
            Formula::DeemedIncome => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Formula::Standard => "standard",
            Formula::NonParentCarer => "non-parent carer",
            Formula::MultiCase => "multi-case",
            Formula::NonParentCarerMultiCase => "non-parent carer, multi-case",
            Formula::ParentUnavailable => "non-parent carer, parent unavailable",
            Formula::ParentDeceased => "non-parent carer, parent deceased",
            Formula::DeemedIncome => "deemed income",
        }
    }

    /// Formulas where only one parent's income is used
    pub fn is_single_parent(&self) -> bool {
        matches!(self, Formula::ParentUnavailable | Formula::ParentDeceased)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number() {
            Some(n) => write!(f, "Formula {n} ({})", self.label()),
            None => write!(f, "Administrative ({})", self.label()),
        }
    }
}

pub struct FormulaSelector<'a> {
    schedule: &'a RateSchedule,
}

impl<'a> FormulaSelector<'a> {
    pub fn new(schedule: &'a RateSchedule) -> Self {
        Self { schedule }
    }

    pub fn select(&self, case: &Case, period: &AssessmentPeriod) -> AssessmentResult<Formula> {
        let p = &self.schedule.parameters;
        let has_child = case
            .children
            .iter()
            .any(|c| c.age_on(period.start) < p.adult_age);
        if !has_child {
            return Err(AssessmentError::UnsupportedCaseShape(format!(
                "case {} has no children under {}",
                case.id, p.adult_age
            )));
        }

        let parents = case.parents();
        let deceased = parents.iter().filter(|p| p.deceased).count();
        let unavailable = parents
            .iter()
            .filter(|p| !p.deceased && !p.jurisdiction.reports_income())
            .count();
        let other_cases = parents.iter().any(|p| p.has_other_cases());

        if case.has_non_parent_carer() {
            self.check_carer_eligible(case, period)?;
            return match (deceased, unavailable) {
                (0, 0) if other_cases => Ok(Formula::NonParentCarerMultiCase),
                (0, 0) => Ok(Formula::NonParentCarer),
                (0, 1) => Ok(Formula::ParentUnavailable),
                (1, 0) => Ok(Formula::ParentDeceased),
                _ => Err(AssessmentError::UnsupportedCaseShape(format!(
                    "case {} has a non-parent carer with {deceased} deceased and {unavailable} unavailable parents",
                    case.id
                ))),
            };
        }

        match (deceased, unavailable) {
            (0, 0) if other_cases => Ok(Formula::MultiCase),
            (0, 0) => Ok(Formula::Standard),
            (0, 1) => Ok(Formula::DeemedIncome),
            (0, _) => Err(AssessmentError::UnsupportedCaseShape(format!(
                "neither parent in case {} can report income",
                case.id
            ))),
            _ => Err(AssessmentError::UnsupportedCaseShape(format!(
                "case {} has a deceased parent and no non-parent carer",
                case.id
            ))),
        }
    }

    /// A non-parent carer must have at least shared care of some child
    fn check_carer_eligible(&self, case: &Case, period: &AssessmentPeriod) -> AssessmentResult<()> {
        let threshold = self.schedule.parameters.shared_care_threshold;
        let days = period.days();
        for carer in &case.carers {
            for child in &case.children {
                let exact = care_percentage(child.nights_with(&carer.id), days)?;
                if round_care(exact) >= threshold {
                    return Ok(());
                }
            }
        }
        Err(AssessmentError::UnsupportedCaseShape(format!(
            "no non-parent carer in case {} has {threshold}% care of any child",
            case.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::fixtures::{child, date, two_parent_snapshot};
    use crate::case::{CaseId, CaseSnapshot, Jurisdiction, NonParentCarer, OtherCase, OtherCaseChild, PartyId};
    use crate::rates::fixtures::bundled_schedule;

    fn with_carer(mut snapshot: CaseSnapshot) -> CaseSnapshot {
        snapshot.case.carers.push(NonParentCarer { id: PartyId::new("G") });
        snapshot.case.children = vec![child("k1", date(2018, 1, 1), &[("G", 365)])];
        snapshot
    }

    fn other_case() -> OtherCase {
        OtherCase {
            case_id: CaseId::new("C-2"),
            other_party: None,
            children: vec![OtherCaseChild { date_of_birth: date(2020, 1, 1) }],
        }
    }

    fn select(snapshot: &CaseSnapshot) -> AssessmentResult<Formula> {
        let schedule = bundled_schedule(2026);
        FormulaSelector::new(&schedule).select(&snapshot.case, &snapshot.period)
    }

    #[test]
    fn test_standard() {
        let snapshot = two_parent_snapshot(80000, 50000, 0, 365);
        assert_eq!(select(&snapshot).unwrap(), Formula::Standard);
    }

    #[test]
    fn test_multi_case() {
        let mut snapshot = two_parent_snapshot(80000, 50000, 0, 365);
        snapshot.case.parent_b.other_cases.push(other_case());
        assert_eq!(select(&snapshot).unwrap(), Formula::MultiCase);
    }

    #[test]
    fn test_non_parent_carer_variants() {
        let snapshot = with_carer(two_parent_snapshot(80000, 50000, 0, 365));
        assert_eq!(select(&snapshot).unwrap(), Formula::NonParentCarer);

        let mut multi = snapshot.clone();
        multi.case.parent_a.other_cases.push(other_case());
        assert_eq!(select(&multi).unwrap(), Formula::NonParentCarerMultiCase);

        let mut overseas = snapshot.clone();
        overseas.case.parent_b.jurisdiction = Jurisdiction::NonReciprocating;
        assert_eq!(select(&overseas).unwrap(), Formula::ParentUnavailable);

        let mut deceased = snapshot;
        deceased.case.parent_b.deceased = true;
        assert_eq!(select(&deceased).unwrap(), Formula::ParentDeceased);
    }

    #[test]
    fn test_overseas_parent_without_carer_needs_deemed_income() {
        let mut snapshot = two_parent_snapshot(80000, 50000, 0, 365);
        snapshot.case.parent_a.jurisdiction = Jurisdiction::NonReciprocating;
        assert_eq!(select(&snapshot).unwrap(), Formula::DeemedIncome);
    }

    #[test]
    fn test_unsupported_shapes() {
        let mut deceased = two_parent_snapshot(80000, 50000, 0, 365);
        deceased.case.parent_a.deceased = true;
        assert!(matches!(select(&deceased), Err(AssessmentError::UnsupportedCaseShape(_))));

        let mut both_overseas = two_parent_snapshot(80000, 50000, 0, 365);
        both_overseas.case.parent_a.jurisdiction = Jurisdiction::Excluded;
        both_overseas.case.parent_b.jurisdiction = Jurisdiction::NonReciprocating;
        assert!(matches!(select(&both_overseas), Err(AssessmentError::UnsupportedCaseShape(_))));

        let mut adults_only = two_parent_snapshot(80000, 50000, 0, 365);
        adults_only.case.children[0].date_of_birth = date(2005, 1, 1);
        assert!(matches!(select(&adults_only), Err(AssessmentError::UnsupportedCaseShape(_))));
    }

    #[test]
    fn test_carer_without_shared_care_is_unsupported() {
        let mut snapshot = two_parent_snapshot(80000, 50000, 0, 365);
        snapshot.case.carers.push(NonParentCarer { id: PartyId::new("G") });
        snapshot.case.children = vec![child("k1", date(2018, 1, 1), &[("G", 30), ("B", 335)])];
        assert!(matches!(select(&snapshot), Err(AssessmentError::UnsupportedCaseShape(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(Formula::Standard.to_string(), "Formula 1 (standard)");
        assert_eq!(Formula::DeemedIncome.to_string(), "Administrative (deemed income)");
    }
}
