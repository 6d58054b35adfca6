//! Input checks run before any computation
//!
//! Nothing here clamps or repairs input: a snapshot either passes or is
//! rejected with the first problem found.

use super::{Case, CaseSnapshot, Parent};
use crate::error::{AssessmentError, AssessmentResult};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Validate a snapshot's period, incomes, parties and care nights
pub fn validate_snapshot(snapshot: &CaseSnapshot) -> AssessmentResult<()> {
    let period = &snapshot.period;
    if period.end < period.start {
        return Err(AssessmentError::InvalidInput(format!(
            "period ends {} before it starts {}",
            period.end, period.start
        )));
    }

    validate_parties(&snapshot.case)?;
    for parent in snapshot.case.parents() {
        validate_income(parent)?;
    }
    validate_care(&snapshot.case, period.days(), period.start)
}

fn validate_parties(case: &Case) -> AssessmentResult<()> {
    let mut seen = BTreeSet::new();
    for id in case.party_ids() {
        if !seen.insert(id.clone()) {
            return Err(AssessmentError::InvalidCaseGraph(format!(
                "party {id} appears more than once in case {}",
                case.id
            )));
        }
    }
    if case.children.is_empty() {
        return Err(AssessmentError::InvalidInput(format!(
            "case {} has no children",
            case.id
        )));
    }
    Ok(())
}

fn validate_income(parent: &Parent) -> AssessmentResult<()> {
    let fields = [
        ("taxable income", Some(parent.taxable_income)),
        ("reportable fringe benefits", Some(parent.reportable_fringe_benefits)),
        ("reportable super contributions", Some(parent.reportable_super_contributions)),
        ("other prescribed amounts", Some(parent.other_prescribed_amounts)),
        ("estimate of income", parent.estimate_of_income),
        ("deemed income", parent.deemed_income),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            if value < Decimal::ZERO {
                return Err(AssessmentError::InvalidInput(format!(
                    "{name} for parent {} is negative ({value})",
                    parent.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_care(case: &Case, days: u32, period_start: chrono::NaiveDate) -> AssessmentResult<()> {
    let parties: BTreeSet<_> = case.party_ids().into_iter().collect();
    let mut child_ids = BTreeSet::new();

    for child in &case.children {
        if !child_ids.insert(child.id.as_str()) {
            return Err(AssessmentError::InvalidInput(format!(
                "child {} listed twice",
                child.id
            )));
        }
        if child.date_of_birth > period_start {
            return Err(AssessmentError::InvalidInput(format!(
                "child {} is born after the period starts",
                child.id
            )));
        }

        let mut total: u64 = 0;
        for (party, nights) in &child.care_nights {
            if !parties.contains(party) {
                return Err(AssessmentError::InvalidInput(format!(
                    "child {} has care recorded for unknown party {party}",
                    child.id
                )));
            }
            if *nights > days {
                return Err(AssessmentError::InvalidInput(format!(
                    "child {} has {nights} nights with {party}, outside [0, {days}]",
                    child.id
                )));
            }
            total += u64::from(*nights);
        }

        if total != u64::from(days) {
            return Err(AssessmentError::InvalidInput(format!(
                "care nights for child {} sum to {total}, period has {days} days",
                child.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::fixtures;
    use crate::case::PartyId;

    #[test]
    fn test_valid_snapshot_passes() {
        let snapshot = fixtures::two_parent_snapshot(80_000, 50_000, 0, 365);
        assert!(validate_snapshot(&snapshot).is_ok());
    }

    #[test]
    fn test_negative_income_rejected() {
        let mut snapshot = fixtures::two_parent_snapshot(80_000, 50_000, 0, 365);
        snapshot.case.parent_a.reportable_fringe_benefits = Decimal::from(-1);
        match validate_snapshot(&snapshot) {
            Err(AssessmentError::InvalidInput(msg)) => assert!(msg.contains("fringe")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_care_nights_must_cover_period() {
        let snapshot = fixtures::two_parent_snapshot(80_000, 50_000, 0, 300);
        match validate_snapshot(&snapshot) {
            Err(AssessmentError::InvalidInput(msg)) => assert!(msg.contains("sum to 300")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_nights_above_period_rejected() {
        let mut snapshot = fixtures::two_parent_snapshot(80_000, 50_000, 0, 365);
        snapshot.case.children[0]
            .care_nights
            .insert(PartyId::new("A"), 400);
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(AssessmentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_same_party_twice_is_invalid_graph() {
        let mut snapshot = fixtures::two_parent_snapshot(80_000, 50_000, 0, 365);
        snapshot.case.parent_b.id = snapshot.case.parent_a.id.clone();
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(AssessmentError::InvalidCaseGraph(_))
        ));
    }
}
