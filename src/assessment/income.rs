//! Income normalization
//!
//! Adjusted taxable income, less the self-support amount and allowances,
//! gives a parent's child support income. The result never goes below zero.

use crate::case::{age_on, Parent};
use crate::error::{AssessmentError, AssessmentResult};
use crate::money::round_cents;
use crate::rates::{classify_children, RateSchedule};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Adjustments an accepted change of assessment makes to one parent's income
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomeOverride {
    /// Replaces adjusted taxable income outright
    #[serde(default)]
    pub deemed_income: Option<Decimal>,
    /// Added to adjusted taxable income
    #[serde(default)]
    pub additional_income: Decimal,
    /// Subtracted from adjusted taxable income, floored at zero
    #[serde(default)]
    pub income_reduction: Decimal,
}

impl IncomeOverride {
    pub fn is_empty(&self) -> bool {
        self.deemed_income.is_none()
            && self.additional_income.is_zero()
            && self.income_reduction.is_zero()
    }
}

/// Per-parent income figures for the breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIncome {
    pub adjusted_taxable_income: Decimal,
    pub self_support_amount: Decimal,
    pub relevant_dependent_allowance: Decimal,
    pub multi_case_allowance: Decimal,
    pub child_support_income: Decimal,
}

impl NormalizedIncome {
    /// Adjusted taxable income less the self-support amount, floored at zero
    pub fn above_self_support(&self) -> Decimal {
        (self.adjusted_taxable_income - self.self_support_amount).max(Decimal::ZERO)
    }

    /// Child support income before the multi-case allowance
    pub fn preliminary_income(&self) -> Decimal {
        (self.above_self_support() - self.relevant_dependent_allowance).max(Decimal::ZERO)
    }
}

pub struct IncomeNormalizer<'a> {
    schedule: &'a RateSchedule,
}

impl<'a> IncomeNormalizer<'a> {
    pub fn new(schedule: &'a RateSchedule) -> Self {
        Self { schedule }
    }

    /// Adjusted taxable income.
    ///
    /// An estimate of income replaces reported taxable income. When
    /// `use_deemed` is set the parent's deemed income replaces the whole
    /// figure and must be present. Overrides apply last.
    pub fn adjusted_taxable_income(
        &self,
        parent: &Parent,
        use_deemed: bool,
        income_override: Option<&IncomeOverride>,
    ) -> AssessmentResult<Decimal> {
        let base = if use_deemed {
            parent
                .deemed_income
                .ok_or_else(|| AssessmentError::DeemedIncomeRequired(parent.id.clone()))?
        } else {
            let taxable = parent.estimate_of_income.unwrap_or(parent.taxable_income);
            taxable
                + parent.reportable_fringe_benefits
                + parent.reportable_super_contributions
                + parent.other_prescribed_amounts
        };

        let adjusted = match income_override {
            Some(o) => {
                let start = o.deemed_income.unwrap_or(base);
                (start + o.additional_income - o.income_reduction).max(Decimal::ZERO)
            }
            None => base,
        };
        Ok(round_cents(adjusted))
    }

    /// Cost of the parent's relevant dependents as if they were the only
    /// children, at the parent's income above self-support
    pub fn relevant_dependent_allowance(
        &self,
        parent: &Parent,
        adjusted_taxable_income: Decimal,
        on: NaiveDate,
    ) -> AssessmentResult<Decimal> {
        let p = &self.schedule.parameters;
        let ages: Vec<u32> = parent
            .relevant_dependents
            .iter()
            .map(|d| age_on(d.date_of_birth, on))
            .filter(|&age| age < p.adult_age)
            .collect();

        let Some((group, count)) = classify_children(&ages, p.older_child_age) else {
            return Ok(Decimal::ZERO);
        };
        let income = (adjusted_taxable_income - p.self_support_amount).max(Decimal::ZERO);
        let cost = self.schedule.costs.cost_of_children(income, group, count)?;
        Ok(cost.total)
    }

    /// Child support income from its parts
    pub fn normalize(
        &self,
        adjusted_taxable_income: Decimal,
        relevant_dependent_allowance: Decimal,
        multi_case_allowance: Decimal,
    ) -> NormalizedIncome {
        let self_support_amount = self.schedule.self_support_amount();
        let child_support_income = (adjusted_taxable_income
            - self_support_amount
            - relevant_dependent_allowance
            - multi_case_allowance)
            .max(Decimal::ZERO);

        NormalizedIncome {
            adjusted_taxable_income,
            self_support_amount,
            relevant_dependent_allowance,
            multi_case_allowance,
            child_support_income: round_cents(child_support_income),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::fixtures::{date, parent};
    use crate::case::RelevantDependent;
    use crate::rates::fixtures::bundled_schedule;
    use rust_decimal_macros::dec;

    #[test]
    fn test_golden_child_support_incomes() {
        let schedule = bundled_schedule(2026);
        let normalizer = IncomeNormalizer::new(&schedule);
        let a = normalizer.normalize(dec!(80000), Decimal::ZERO, Decimal::ZERO);
        let b = normalizer.normalize(dec!(50000), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(a.child_support_income, dec!(48954));
        assert_eq!(b.child_support_income, dec!(18954));
    }

    #[test]
    fn test_income_below_self_support_floors_at_zero() {
        let schedule = bundled_schedule(2026);
        let normalizer = IncomeNormalizer::new(&schedule);
        for income in [0, 1, 20000, 31045, 31046] {
            let n = normalizer.normalize(Decimal::from(income), dec!(5000), dec!(5000));
            assert!(n.child_support_income >= Decimal::ZERO);
            assert_eq!(n.child_support_income, Decimal::ZERO);
        }
    }

    #[test]
    fn test_adjusted_taxable_income_components() {
        let schedule = bundled_schedule(2026);
        let normalizer = IncomeNormalizer::new(&schedule);
        let mut p = parent("A", 70000);
        p.reportable_fringe_benefits = dec!(2500);
        p.reportable_super_contributions = dec!(4000);
        p.other_prescribed_amounts = dec!(500);
        assert_eq!(normalizer.adjusted_taxable_income(&p, false, None).unwrap(), dec!(77000));

        p.estimate_of_income = Some(dec!(60000));
        assert_eq!(normalizer.adjusted_taxable_income(&p, false, None).unwrap(), dec!(67000));
    }

    #[test]
    fn test_deemed_income_required() {
        let schedule = bundled_schedule(2026);
        let normalizer = IncomeNormalizer::new(&schedule);
        let mut p = parent("A", 70000);
        assert!(matches!(
            normalizer.adjusted_taxable_income(&p, true, None),
            Err(AssessmentError::DeemedIncomeRequired(_))
        ));
        p.deemed_income = Some(dec!(55000));
        assert_eq!(normalizer.adjusted_taxable_income(&p, true, None).unwrap(), dec!(55000));
    }

    #[test]
    fn test_override_applies_after_components() {
        let schedule = bundled_schedule(2026);
        let normalizer = IncomeNormalizer::new(&schedule);
        let p = parent("A", 40000);
        let o = IncomeOverride {
            deemed_income: Some(dec!(90000)),
            additional_income: dec!(5000),
            income_reduction: Decimal::ZERO,
        };
        assert_eq!(normalizer.adjusted_taxable_income(&p, false, Some(&o)).unwrap(), dec!(95000));

        let o = IncomeOverride {
            income_reduction: dec!(50000),
            ..Default::default()
        };
        assert_eq!(normalizer.adjusted_taxable_income(&p, false, Some(&o)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_relevant_dependent_allowance() {
        let schedule = bundled_schedule(2026);
        let normalizer = IncomeNormalizer::new(&schedule);
        let mut p = parent("A", 80000);
        p.relevant_dependents.push(RelevantDependent { date_of_birth: date(2022, 6, 1) });
        let allowance = normalizer
            .relevant_dependent_allowance(&p, dec!(80000), date(2026, 1, 1))
            .unwrap();
        // one child under 13 at 48954: 7917 + (48954 - 46569) * 15%
        assert_eq!(allowance, dec!(8274.75));

        let n = normalizer.normalize(dec!(80000), allowance, Decimal::ZERO);
        assert_eq!(n.child_support_income, dec!(40679.25));
    }

    #[test]
    fn test_adult_dependents_ignored() {
        let schedule = bundled_schedule(2026);
        let normalizer = IncomeNormalizer::new(&schedule);
        let mut p = parent("A", 80000);
        p.relevant_dependents.push(RelevantDependent { date_of_birth: date(2000, 1, 1) });
        let allowance = normalizer
            .relevant_dependent_allowance(&p, dec!(80000), date(2026, 1, 1))
            .unwrap();
        assert_eq!(allowance, Decimal::ZERO);
    }
}
