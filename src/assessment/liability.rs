//! Liability arithmetic
//!
//! Per-child formula amounts, splitting an amount between eligible payees,
//! the minimum and fixed annual rates, and netting child liabilities into
//! payments.

use super::record::{ChildLiability, LiabilityBasis, Payment, PeriodicAmounts};
use crate::case::PartyId;
use crate::money::{apply_percentage, round_cents};
use crate::rates::ScheduleParameters;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// `max(0, income% - cost%)` of `cost`, to the cent
pub fn annual_liability(income_percentage: Decimal, cost_percentage: Decimal, cost: Decimal) -> Decimal {
    let child_support_percentage = (income_percentage - cost_percentage).max(Decimal::ZERO);
    apply_percentage(cost, child_support_percentage)
}

/// A party able to receive payment for a child, weighted by cost percentage
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub party: PartyId,
    pub cost_percentage: Decimal,
}

/// Split `amount` between recipients in proportion to their cost percentages.
/// The last recipient takes the rounding remainder so the parts add up.
pub fn split_between(
    payer: &PartyId,
    amount: Decimal,
    recipients: &[Recipient],
    basis: LiabilityBasis,
) -> Vec<ChildLiability> {
    if amount <= Decimal::ZERO || recipients.is_empty() {
        return Vec::new();
    }
    let weight: Decimal = recipients.iter().map(|r| r.cost_percentage).sum();
    let count = Decimal::from(recipients.len() as u64);

    let mut remaining = amount;
    let mut parts = Vec::with_capacity(recipients.len());
    for (i, recipient) in recipients.iter().enumerate() {
        let share = if i + 1 == recipients.len() {
            remaining
        } else if weight > Decimal::ZERO {
            round_cents(amount * recipient.cost_percentage / weight)
        } else {
            round_cents(amount / count)
        };
        remaining -= share;
        parts.push(ChildLiability {
            payer: payer.clone(),
            payee: recipient.party.clone(),
            annual_amount: share,
            basis,
        });
    }
    parts
}

/// Parent-level facts the special rates are tested against
#[derive(Debug, Clone)]
pub struct RateEligibility {
    pub receives_income_support: bool,
    pub adjusted_taxable_income: Decimal,
    /// The parent's rounded care of each child in the assessment
    pub care_by_child: Vec<u8>,
    /// Sum of the parent's formula liabilities in this case
    pub formula_total: Decimal,
    /// Other cases with a child under the adult age
    pub other_active_cases: usize,
    /// Children under the adult age in those other cases
    pub other_case_children: usize,
}

/// Minimum annual rate for this case, if it applies.
///
/// Applies to a parent on income support with less than regular care of
/// every child whose formula liability is below the rate. Beyond the case
/// limit the rate is shared across the parent's cases.
pub fn minimum_annual_rate(params: &ScheduleParameters, facts: &RateEligibility) -> Option<Decimal> {
    if !facts.receives_income_support {
        return None;
    }
    if facts.care_by_child.iter().any(|&care| care >= params.regular_care_threshold) {
        return None;
    }
    if facts.formula_total >= params.minimum_annual_rate {
        return None;
    }

    let cases = 1 + facts.other_active_cases as u64;
    let limit = u64::from(params.minimum_rate_case_limit);
    let rate = if cases > limit {
        round_cents(params.minimum_annual_rate * Decimal::from(limit) / Decimal::from(cases))
    } else {
        params.minimum_annual_rate
    };
    Some(rate)
}

/// Fixed annual rate per eligible child, with the indices of those children.
///
/// Applies to a parent not on income support whose adjusted taxable income
/// is below the maximum Parenting Payment (single) rate, for each child in
/// which the parent has less than shared care. Beyond the child limit the
/// rate is shared across every child the parent supports.
pub fn fixed_annual_rate(params: &ScheduleParameters, facts: &RateEligibility) -> Option<(Decimal, Vec<usize>)> {
    if facts.receives_income_support {
        return None;
    }
    if facts.adjusted_taxable_income >= params.max_parenting_payment_single {
        return None;
    }
    let eligible: Vec<usize> = facts
        .care_by_child
        .iter()
        .enumerate()
        .filter(|&(_, &care)| care < params.shared_care_threshold)
        .map(|(i, _)| i)
        .collect();
    if eligible.is_empty() {
        return None;
    }

    let total_children = (eligible.len() + facts.other_case_children) as u64;
    let limit = u64::from(params.fixed_rate_child_limit);
    let per_child = if total_children > limit {
        round_cents(params.fixed_annual_rate * Decimal::from(limit) / Decimal::from(total_children))
    } else {
        params.fixed_annual_rate
    };
    Some((per_child, eligible))
}

/// Net child liabilities into payments.
///
/// Amounts between the same two parties offset each other, so only the
/// larger direction survives.
pub fn net_payments(liabilities: &[ChildLiability]) -> Vec<Payment> {
    let mut gross: BTreeMap<(PartyId, PartyId), Decimal> = BTreeMap::new();
    for liability in liabilities {
        *gross
            .entry((liability.payer.clone(), liability.payee.clone()))
            .or_default() += liability.annual_amount;
    }

    let mut payments = Vec::new();
    for ((payer, payee), amount) in &gross {
        let reverse = gross
            .get(&(payee.clone(), payer.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO);
        let net = *amount - reverse;
        if net > Decimal::ZERO {
            payments.push(Payment {
                payer: payer.clone(),
                payee: payee.clone(),
                amount: PeriodicAmounts::from_annual(net),
            });
        }
    }
    payments
}

/// The payer with the largest outgoing total, their largest payee, and that total
pub fn headline(payments: &[Payment]) -> (Option<PartyId>, Option<PartyId>, Decimal) {
    let mut outgoing: BTreeMap<&PartyId, Decimal> = BTreeMap::new();
    for payment in payments {
        *outgoing.entry(&payment.payer).or_default() += payment.amount.annual;
    }
    let Some((payer, total)) = outgoing
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
    else {
        return (None, None, Decimal::ZERO);
    };
    let payee = payments
        .iter()
        .filter(|p| &p.payer == payer)
        .max_by(|a, b| a.amount.annual.cmp(&b.amount.annual).then_with(|| b.payee.cmp(&a.payee)))
        .map(|p| p.payee.clone());
    (Some(payer.clone()), payee, total)
}
