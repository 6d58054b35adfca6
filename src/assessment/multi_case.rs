//! Multi-case adjustment
//!
//! A parent with children in more than one case has the cost of all those
//! children worked out together. Each other-case child takes a per-child
//! share of that combined cost out of the parent's income (the multi-case
//! allowance), and the parent's liability for each child in this case is
//! capped at what it would be if the combined cost were shared evenly.

use crate::case::{age_on, Case, CaseId, Parent};
use crate::error::{AssessmentError, AssessmentResult};
use crate::money::{apply_percentage, round_cents, HUNDRED};
use crate::rates::{classify_children, RateSchedule};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Check one case's other-case links for self references and duplicates
pub fn validate_case_links(case: &Case) -> AssessmentResult<()> {
    for parent in case.parents() {
        let co_parent = case.parents().into_iter().find(|p| p.id != parent.id);
        let mut seen = BTreeSet::new();

        for link in &parent.other_cases {
            if link.case_id == case.id {
                return Err(AssessmentError::InvalidCaseGraph(format!(
                    "parent {} lists case {} as one of its own other cases",
                    parent.id, case.id
                )));
            }
            if !seen.insert(&link.case_id) {
                return Err(AssessmentError::InvalidCaseGraph(format!(
                    "parent {} lists other case {} twice",
                    parent.id, link.case_id
                )));
            }
            if link.other_party.as_ref() == Some(&parent.id) {
                return Err(AssessmentError::InvalidCaseGraph(format!(
                    "parent {} is recorded as its own partner in case {}",
                    parent.id, link.case_id
                )));
            }
            if let (Some(other), Some(co_parent)) = (&link.other_party, co_parent) {
                if other == &co_parent.id {
                    return Err(AssessmentError::InvalidCaseGraph(format!(
                        "case {} repeats the parents of case {}",
                        link.case_id, case.id
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Check links across a set of cases.
///
/// Two cases sharing a parent list each other; that mutual link is the
/// normal shape. A link is rejected when the target case does not contain
/// the linking parent or does not link back, since such a chain can lead
/// back to its origin without shared parenthood. Links to cases outside
/// the set are not checked.
pub fn validate_portfolio(cases: &[Case]) -> AssessmentResult<()> {
    let mut index: BTreeMap<&CaseId, &Case> = BTreeMap::new();
    for case in cases {
        if index.insert(&case.id, case).is_some() {
            return Err(AssessmentError::InvalidCaseGraph(format!(
                "case {} appears twice",
                case.id
            )));
        }
    }

    for case in cases {
        validate_case_links(case)?;
        for parent in case.parents() {
            for link in &parent.other_cases {
                let Some(target) = index.get(&link.case_id) else {
                    continue;
                };
                let Some(target_parent) = target.parent(&parent.id) else {
                    return Err(AssessmentError::InvalidCaseGraph(format!(
                        "case {} links to case {} through parent {}, who is not a party to it",
                        case.id, link.case_id, parent.id
                    )));
                };
                if !target_parent.other_cases.iter().any(|l| l.case_id == case.id) {
                    return Err(AssessmentError::InvalidCaseGraph(format!(
                        "case {} links to case {} but the link is not reciprocated",
                        case.id, link.case_id
                    )));
                }
            }
        }
    }
    Ok(())
}

pub struct MultiCaseAdjuster<'a> {
    schedule: &'a RateSchedule,
}

impl<'a> MultiCaseAdjuster<'a> {
    pub fn new(schedule: &'a RateSchedule) -> Self {
        Self { schedule }
    }

    /// Ages of the parent's children in other cases, adults excluded
    pub fn other_case_ages(&self, parent: &Parent, on: NaiveDate) -> Vec<u32> {
        let adult_age = self.schedule.parameters.adult_age;
        parent
            .other_cases
            .iter()
            .flat_map(|c| c.children.iter())
            .map(|child| age_on(child.date_of_birth, on))
            .filter(|&age| age < adult_age)
            .collect()
    }

    /// Number of other cases that still have a child under the adult age
    pub fn active_other_cases(&self, parent: &Parent, on: NaiveDate) -> usize {
        let adult_age = self.schedule.parameters.adult_age;
        parent
            .other_cases
            .iter()
            .filter(|c| {
                c.children
                    .iter()
                    .any(|child| age_on(child.date_of_birth, on) < adult_age)
            })
            .count()
    }

    /// Cost per child if every one of `total_children` were `age`
    fn same_age_cost_per_child(
        &self,
        income: Decimal,
        age: u32,
        total_children: usize,
    ) -> AssessmentResult<Decimal> {
        if total_children == 0 {
            return Ok(Decimal::ZERO);
        }
        let ages = vec![age; total_children];
        let Some((group, count)) = classify_children(&ages, self.schedule.parameters.older_child_age)
        else {
            return Ok(Decimal::ZERO);
        };
        let cost = self.schedule.costs.cost_of_children(income, group, count)?;
        Ok(cost.total / Decimal::from(total_children as u64))
    }

    /// Multi-case allowance for one parent.
    ///
    /// `income` is the parent's adjusted taxable income less self-support;
    /// `case_ages` are the ages of the children in the case being assessed.
    pub fn allowance(
        &self,
        income: Decimal,
        case_ages: &[u32],
        other_ages: &[u32],
    ) -> AssessmentResult<Decimal> {
        if other_ages.is_empty() {
            return Ok(Decimal::ZERO);
        }
        let total = case_ages.len() + other_ages.len();
        let mut allowance = Decimal::ZERO;
        for &age in other_ages {
            allowance += self.same_age_cost_per_child(income, age, total)?;
        }
        log::debug!(
            "Multi-case allowance {} for {} other-case children of {total}",
            round_cents(allowance),
            other_ages.len()
        );
        Ok(round_cents(allowance))
    }

    /// Most the parent can be liable for one child in this case.
    ///
    /// `income` is the parent's child support income before the multi-case
    /// allowance; `cost_percentage` is the parent's own cost percentage for
    /// the child.
    pub fn liability_cap(
        &self,
        income: Decimal,
        child_age: u32,
        total_children: usize,
        cost_percentage: Decimal,
    ) -> AssessmentResult<Decimal> {
        let per_child = self.same_age_cost_per_child(income, child_age, total_children)?;
        let remaining = (HUNDRED - cost_percentage).max(Decimal::ZERO);
        Ok(apply_percentage(per_child, remaining))
    }
}
