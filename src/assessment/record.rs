//! Assessment records and their worked breakdown

use super::care::CareShare;
use super::formula::Formula;
use super::income::NormalizedIncome;
use crate::case::{CaseId, PartyId};
use crate::money::round_cents;
use crate::rates::{CostOfChildren, RatesApplied};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentId(pub String);

impl AssessmentId {
    /// Deterministic id: the same case, date and version always give the same id
    pub fn for_case(case_id: &CaseId, effective_from: NaiveDate, version: u32) -> Self {
        Self(format!("{case_id}-{effective_from}-v{version}"))
    }
}

impl fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flat rate substituted for a parent's formula liability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rate", rename_all = "snake_case")]
pub enum SpecialRate {
    MinimumAnnualRate { annual_amount: Decimal },
    FixedAnnualRate { children: u32, annual_amount: Decimal },
}

/// How a child liability amount was arrived at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiabilityBasis {
    Formula,
    MultiCaseCap,
    MinimumAnnualRate,
    FixedAnnualRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentBreakdown {
    pub party: PartyId,
    /// False for a deceased or unavailable parent under Formula 5 or 6
    pub assessable: bool,
    pub income: NormalizedIncome,
    pub income_percentage: Decimal,
    /// Mean cost percentage across the children in the assessment
    pub cost_percentage: Decimal,
    pub special_rate: Option<SpecialRate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyPercentage {
    pub party: PartyId,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildLiability {
    pub payer: PartyId,
    pub payee: PartyId,
    pub annual_amount: Decimal,
    pub basis: LiabilityBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildBreakdown {
    pub child_id: String,
    pub age: u32,
    /// Adults are listed but take no part in the assessment
    pub included: bool,
    pub cost_of_child: Decimal,
    pub care: Vec<CareShare>,
    pub child_support_percentages: Vec<PartyPercentage>,
    pub liabilities: Vec<ChildLiability>,
}

/// Annual amount with its periodic equivalents
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodicAmounts {
    pub annual: Decimal,
    pub monthly: Decimal,
    pub fortnightly: Decimal,
    pub weekly: Decimal,
}

impl PeriodicAmounts {
    pub fn from_annual(annual: Decimal) -> Self {
        Self {
            annual: round_cents(annual),
            monthly: round_cents(annual / Decimal::from(12)),
            fortnightly: round_cents(annual / Decimal::from(26)),
            weekly: round_cents(annual / Decimal::from(52)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payer: PartyId,
    pub payee: PartyId,
    pub amount: PeriodicAmounts,
}

/// A formula assessment. Never edited once made; a later record supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub version: u32,
    pub case_id: CaseId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub days_in_period: u32,
    pub effective_from: NaiveDate,
    pub supersedes: Option<AssessmentId>,
    pub formula: Formula,
    pub rates: RatesApplied,
    pub parents: Vec<ParentBreakdown>,
    pub combined_child_support_income: Decimal,
    pub cost_of_children: CostOfChildren,
    /// Change-of-assessment adjustment to the table cost
    pub cost_of_children_adjustment: Decimal,
    pub total_cost_of_children: Decimal,
    pub children: Vec<ChildBreakdown>,
    pub payments: Vec<Payment>,
    pub annual_liability: Decimal,
    pub payer_id: Option<PartyId>,
    pub payee_id: Option<PartyId>,
    pub periodic: PeriodicAmounts,
}

impl Assessment {
    pub fn parent(&self, party: &PartyId) -> Option<&ParentBreakdown> {
        self.parents.iter().find(|p| &p.party == party)
    }

    pub fn child_support_income(&self, party: &PartyId) -> Option<Decimal> {
        self.parent(party).map(|p| p.income.child_support_income)
    }

    pub fn income_percentage(&self, party: &PartyId) -> Option<Decimal> {
        self.parent(party).map(|p| p.income_percentage)
    }

    pub fn cost_percentage(&self, party: &PartyId) -> Option<Decimal> {
        self.parent(party).map(|p| p.cost_percentage)
    }

    /// Annual amount `payer` pays `payee`, zero if none
    pub fn payment_between(&self, payer: &PartyId, payee: &PartyId) -> Decimal {
        self.payments
            .iter()
            .find(|p| &p.payer == payer && &p.payee == payee)
            .map(|p| p.amount.annual)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn summary(&self) -> String {
        match (&self.payer_id, &self.payee_id) {
            (Some(payer), Some(payee)) => format!(
                "{payer} pays {payee} ${} a year ({} a month) under {}",
                self.annual_liability, self.periodic.monthly, self.formula
            ),
            _ => format!("no child support payable under {}", self.formula),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_periodic_amounts() {
        let amounts = PeriodicAmounts::from_annual(dec!(13680));
        assert_eq!(amounts.monthly, dec!(1140.00));
        assert_eq!(amounts.fortnightly, dec!(526.15));
        assert_eq!(amounts.weekly, dec!(263.08));
    }

    #[test]
    fn test_assessment_id_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let a = AssessmentId::for_case(&CaseId::new("C-1"), date, 1);
        let b = AssessmentId::for_case(&CaseId::new("C-1"), date, 1);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "C-1-2026-01-01-v1");
    }
}
