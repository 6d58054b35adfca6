//! Assessment calculator
//!
//! Runs one case snapshot through income normalization, multi-case
//! adjustment, care conversion and the cost table under the formula the
//! selector picks, then applies the minimum and fixed annual rates.
//! Pure: no I/O, no shared mutable state.

use super::care::{CareShare, CareToCostConverter};
use super::formula::{Formula, FormulaSelector};
use super::income::{IncomeNormalizer, IncomeOverride, NormalizedIncome};
use super::liability::{self, RateEligibility, Recipient};
use super::multi_case::{validate_case_links, MultiCaseAdjuster};
use super::record::{
    Assessment, AssessmentId, ChildBreakdown, ChildLiability, LiabilityBasis, ParentBreakdown,
    PartyPercentage, PeriodicAmounts, SpecialRate,
};
use crate::case::{validate_snapshot, CaseSnapshot, Parent, PartyId};
use crate::error::{AssessmentError, AssessmentResult};
use crate::money::{apply_percentage, percentage_of, round_cents, round_percentage, HUNDRED};
use crate::rates::{classify_children, CostOfChildren, RateRegistry, RateSchedule};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Adjustments applied on top of the snapshot, from an accepted change of assessment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentOverrides {
    #[serde(default)]
    pub income: BTreeMap<PartyId, IncomeOverride>,
    /// Added to the table cost of the children (negative to reduce it)
    #[serde(default)]
    pub cost_of_children_adjustment: Decimal,
}

impl AssessmentOverrides {
    pub fn is_empty(&self) -> bool {
        self.income.values().all(IncomeOverride::is_empty)
            && self.cost_of_children_adjustment.is_zero()
    }

    /// Combine with a later set of adjustments. Amounts add up; a later
    /// deemed income replaces an earlier one.
    pub fn merge(&self, later: &AssessmentOverrides) -> AssessmentOverrides {
        let mut merged = self.clone();
        for (party, adjustment) in &later.income {
            let entry = merged.income.entry(party.clone()).or_default();
            if adjustment.deemed_income.is_some() {
                entry.deemed_income = adjustment.deemed_income;
            }
            entry.additional_income += adjustment.additional_income;
            entry.income_reduction += adjustment.income_reduction;
        }
        merged.cost_of_children_adjustment += later.cost_of_children_adjustment;
        merged
    }
}

#[derive(Debug, Clone)]
pub struct AssessmentCalculator {
    registry: Arc<RateRegistry>,
}

impl AssessmentCalculator {
    pub fn new(registry: Arc<RateRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RateRegistry {
        &self.registry
    }

    /// Schedule named by the snapshot, or in force at the period start
    pub fn schedule_for(&self, snapshot: &CaseSnapshot) -> AssessmentResult<&RateSchedule> {
        match snapshot.financial_year {
            Some(year) => self.registry.for_year(year),
            None => self.registry.for_date(snapshot.period.start),
        }
    }

    /// First assessment of a snapshot, effective from the period start
    pub fn assess(&self, snapshot: &CaseSnapshot) -> AssessmentResult<Assessment> {
        self.assess_with(snapshot, &AssessmentOverrides::default())
    }

    pub fn assess_with(
        &self,
        snapshot: &CaseSnapshot,
        overrides: &AssessmentOverrides,
    ) -> AssessmentResult<Assessment> {
        self.build(snapshot, overrides, snapshot.period.start, 1, None)
    }

    /// New assessment superseding `previous` from `effective_from`.
    /// `previous` itself is left untouched.
    pub fn reassess(
        &self,
        previous: &Assessment,
        snapshot: &CaseSnapshot,
        overrides: &AssessmentOverrides,
        effective_from: NaiveDate,
    ) -> AssessmentResult<Assessment> {
        if previous.case_id != snapshot.case.id {
            return Err(AssessmentError::InvalidInput(format!(
                "assessment {} belongs to case {}, not {}",
                previous.id, previous.case_id, snapshot.case.id
            )));
        }
        self.build(
            snapshot,
            overrides,
            effective_from,
            previous.version + 1,
            Some(previous.id.clone()),
        )
    }

    fn build(
        &self,
        snapshot: &CaseSnapshot,
        overrides: &AssessmentOverrides,
        effective_from: NaiveDate,
        version: u32,
        supersedes: Option<AssessmentId>,
    ) -> AssessmentResult<Assessment> {
        let case = &snapshot.case;
        if let Some(binding) = &case.binding_determination {
            return Err(AssessmentError::BindingDeterminationActive {
                case: case.id.clone(),
                kind: binding.label().to_string(),
            });
        }
        validate_snapshot(snapshot)?;
        validate_case_links(case)?;

        let schedule = self.schedule_for(snapshot)?;
        let formula = FormulaSelector::new(schedule).select(case, &snapshot.period)?;
        let run = FormulaRun::new(schedule, snapshot, overrides)?;

        let outcome = match formula {
            Formula::Standard
            | Formula::MultiCase
            | Formula::NonParentCarer
            | Formula::NonParentCarerMultiCase => run.both_parents(false)?,
            Formula::DeemedIncome => run.both_parents(true)?,
            Formula::ParentUnavailable => run.single_parent(true)?,
            Formula::ParentDeceased => run.single_parent(false)?,
        };

        let liabilities: Vec<ChildLiability> = outcome
            .children
            .iter()
            .flat_map(|c| c.liabilities.iter().cloned())
            .collect();
        let payments = liability::net_payments(&liabilities);
        let (payer_id, payee_id, annual_liability) = liability::headline(&payments);

        log::debug!(
            "Case {} assessed under {}: combined income {}, cost {}, liability {}",
            case.id,
            formula,
            outcome.combined_income,
            outcome.total_cost,
            annual_liability
        );

        Ok(Assessment {
            id: AssessmentId::for_case(&case.id, effective_from, version),
            version,
            case_id: case.id.clone(),
            period_start: snapshot.period.start,
            period_end: snapshot.period.end,
            days_in_period: snapshot.period.days(),
            effective_from,
            supersedes,
            formula,
            rates: schedule.rates_applied(),
            parents: outcome.parents,
            combined_child_support_income: outcome.combined_income,
            cost_of_children: outcome.cost,
            cost_of_children_adjustment: overrides.cost_of_children_adjustment,
            total_cost_of_children: outcome.total_cost,
            children: outcome.children,
            payments,
            annual_liability,
            payer_id,
            payee_id,
            periodic: PeriodicAmounts::from_annual(annual_liability),
        })
    }
}

// ============================================================================
// Formula run
// ============================================================================

/// Care of one child by every party
struct ChildCare {
    id: String,
    age: u32,
    included: bool,
    care: Vec<CareShare>,
}

impl ChildCare {
    fn share(&self, party: &PartyId) -> Option<&CareShare> {
        self.care.iter().find(|s| &s.party == party)
    }

    fn cost_percentage(&self, party: &PartyId) -> Decimal {
        self.share(party).map(|s| s.cost_percentage).unwrap_or(Decimal::ZERO)
    }

    fn rounded_care(&self, party: &PartyId) -> u8 {
        self.share(party).map(|s| s.rounded_care).unwrap_or(0)
    }

    fn excluded_row(&self) -> ChildBreakdown {
        ChildBreakdown {
            child_id: self.id.clone(),
            age: self.age,
            included: false,
            cost_of_child: Decimal::ZERO,
            care: self.care.clone(),
            child_support_percentages: Vec::new(),
            liabilities: Vec::new(),
        }
    }
}

struct ParentIncome<'a> {
    parent: &'a Parent,
    income: NormalizedIncome,
    other_ages: Vec<u32>,
}

struct Outcome {
    parents: Vec<ParentBreakdown>,
    combined_income: Decimal,
    cost: CostOfChildren,
    total_cost: Decimal,
    children: Vec<ChildBreakdown>,
}

struct FormulaRun<'a> {
    schedule: &'a RateSchedule,
    snapshot: &'a CaseSnapshot,
    overrides: &'a AssessmentOverrides,
    normalizer: IncomeNormalizer<'a>,
    adjuster: MultiCaseAdjuster<'a>,
    children: Vec<ChildCare>,
}

impl<'a> FormulaRun<'a> {
    fn new(
        schedule: &'a RateSchedule,
        snapshot: &'a CaseSnapshot,
        overrides: &'a AssessmentOverrides,
    ) -> AssessmentResult<Self> {
        let converter = CareToCostConverter::new(&schedule.care);
        let days = snapshot.period.days();
        let parties = snapshot.case.party_ids();
        let adult_age = schedule.parameters.adult_age;

        let mut children = Vec::with_capacity(snapshot.case.children.len());
        for child in &snapshot.case.children {
            let care = parties
                .iter()
                .map(|party| converter.convert(party, child.nights_with(party), days))
                .collect::<AssessmentResult<Vec<_>>>()?;
            let age = child.age_on(snapshot.period.start);
            children.push(ChildCare {
                id: child.id.clone(),
                age,
                included: age < adult_age,
                care,
            });
        }

        Ok(Self {
            schedule,
            snapshot,
            overrides,
            normalizer: IncomeNormalizer::new(schedule),
            adjuster: MultiCaseAdjuster::new(schedule),
            children,
        })
    }

    fn included_ages(&self) -> Vec<u32> {
        self.children.iter().filter(|c| c.included).map(|c| c.age).collect()
    }

    fn parent_income(
        &self,
        parent: &'a Parent,
        use_deemed: bool,
        case_ages: &[u32],
    ) -> AssessmentResult<ParentIncome<'a>> {
        let on = self.snapshot.period.start;
        let ati = self.normalizer.adjusted_taxable_income(
            parent,
            use_deemed,
            self.overrides.income.get(&parent.id),
        )?;
        let relevant_dependents = self.normalizer.relevant_dependent_allowance(parent, ati, on)?;
        let other_ages = self.adjuster.other_case_ages(parent, on);
        let above_self_support = (ati - self.schedule.self_support_amount()).max(Decimal::ZERO);
        let multi_case = self.adjuster.allowance(above_self_support, case_ages, &other_ages)?;

        Ok(ParentIncome {
            parent,
            income: self.normalizer.normalize(ati, relevant_dependents, multi_case),
            other_ages,
        })
    }

    /// Table cost at `income`, the adjusted total, and the share per child
    fn cost_of_children(&self, income: Decimal) -> AssessmentResult<(CostOfChildren, Decimal, Decimal)> {
        let ages = self.included_ages();
        let (group, count) = classify_children(&ages, self.schedule.parameters.older_child_age)
            .ok_or_else(|| {
                AssessmentError::UnsupportedCaseShape("no children in the assessment".to_string())
            })?;
        let cost = self.schedule.costs.cost_of_children(income, group, count)?;
        let total = round_cents(
            (cost.total + self.overrides.cost_of_children_adjustment).max(Decimal::ZERO),
        );
        let per_child = round_cents(total / Decimal::from(ages.len() as u64));
        Ok((cost, total, per_child))
    }

    /// Parties other than `payer` with at least shared care of the child
    fn recipients(&self, child: &ChildCare, payer: &PartyId, allowed: Option<&[PartyId]>) -> Vec<Recipient> {
        let threshold = self.schedule.parameters.shared_care_threshold;
        child
            .care
            .iter()
            .filter(|s| &s.party != payer && s.rounded_care >= threshold)
            .filter(|s| allowed.map_or(true, |list| list.contains(&s.party)))
            .map(|s| Recipient {
                party: s.party.clone(),
                cost_percentage: s.cost_percentage,
            })
            .collect()
    }

    fn mean_cost_percentage(&self, party: &PartyId) -> Decimal {
        let included: Vec<&ChildCare> = self.children.iter().filter(|c| c.included).collect();
        if included.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = included.iter().map(|c| c.cost_percentage(party)).sum();
        round_percentage(sum / Decimal::from(included.len() as u64))
    }

    /// Cap a parent's formula amount for a child when they have other cases
    fn capped(
        &self,
        income: &ParentIncome<'_>,
        child: &ChildCare,
        cost_percentage: Decimal,
        amount: Decimal,
        case_children: usize,
    ) -> AssessmentResult<(Decimal, LiabilityBasis)> {
        if income.other_ages.is_empty() || amount <= Decimal::ZERO {
            return Ok((amount, LiabilityBasis::Formula));
        }
        let cap = self.adjuster.liability_cap(
            income.income.preliminary_income(),
            child.age,
            case_children + income.other_ages.len(),
            cost_percentage,
        )?;
        if cap < amount {
            Ok((cap, LiabilityBasis::MultiCaseCap))
        } else {
            Ok((amount, LiabilityBasis::Formula))
        }
    }

    // ------------------------------------------------------------------------
    // Formulas 1 to 4 and deemed income
    // ------------------------------------------------------------------------

    fn both_parents(&self, deemed: bool) -> AssessmentResult<Outcome> {
        let case = &self.snapshot.case;
        let case_ages = self.included_ages();

        let mut incomes = Vec::with_capacity(2);
        for parent in case.parents() {
            let use_deemed = deemed && !parent.jurisdiction.reports_income();
            incomes.push(self.parent_income(parent, use_deemed, &case_ages)?);
        }

        let combined: Decimal = incomes.iter().map(|i| i.income.child_support_income).sum();
        let income_percentages: Vec<Decimal> = incomes
            .iter()
            .map(|i| percentage_of(i.income.child_support_income, combined))
            .collect();
        let (cost, total_cost, per_child) = self.cost_of_children(combined)?;

        let mut rows = Vec::with_capacity(self.children.len());
        let mut formula_totals = vec![Decimal::ZERO; incomes.len()];
        for child in &self.children {
            if !child.included {
                rows.push(child.excluded_row());
                continue;
            }
            let mut percentages = Vec::with_capacity(incomes.len());
            let mut liabilities = Vec::new();
            for (i, income) in incomes.iter().enumerate() {
                let party = &income.parent.id;
                let cost_percentage = child.cost_percentage(party);
                percentages.push(PartyPercentage {
                    party: party.clone(),
                    percentage: round_percentage(income_percentages[i] - cost_percentage),
                });

                let amount = liability::annual_liability(income_percentages[i], cost_percentage, per_child);
                let (amount, basis) = self.capped(income, child, cost_percentage, amount, case_ages.len())?;
                let parts = liability::split_between(party, amount, &self.recipients(child, party, None), basis);
                formula_totals[i] += parts.iter().map(|p| p.annual_amount).sum::<Decimal>();
                liabilities.extend(parts);
            }
            rows.push(ChildBreakdown {
                child_id: child.id.clone(),
                age: child.age,
                included: true,
                cost_of_child: per_child,
                care: child.care.clone(),
                child_support_percentages: percentages,
                liabilities,
            });
        }

        let on = self.snapshot.period.start;
        let mut parents = Vec::with_capacity(incomes.len());
        for (i, income) in incomes.iter().enumerate() {
            let party = &income.parent.id;
            let facts = RateEligibility {
                receives_income_support: income.parent.receives_income_support,
                adjusted_taxable_income: income.income.adjusted_taxable_income,
                care_by_child: self
                    .children
                    .iter()
                    .filter(|c| c.included)
                    .map(|c| c.rounded_care(party))
                    .collect(),
                formula_total: formula_totals[i],
                other_active_cases: self.adjuster.active_other_cases(income.parent, on),
                other_case_children: income.other_ages.len(),
            };
            let special_rate = self.apply_special_rates(party, &facts, None, &mut rows);
            parents.push(ParentBreakdown {
                party: party.clone(),
                assessable: true,
                income: income.income.clone(),
                income_percentage: income_percentages[i],
                cost_percentage: self.mean_cost_percentage(party),
                special_rate,
            });
        }

        Ok(Outcome {
            parents,
            combined_income: combined,
            cost,
            total_cost,
            children: rows,
        })
    }

    /// Replace a parent's formula liabilities with the minimum or fixed annual
    /// rate, paid to `allowed` recipients when given
    fn apply_special_rates(
        &self,
        party: &PartyId,
        facts: &RateEligibility,
        allowed: Option<&[PartyId]>,
        rows: &mut [ChildBreakdown],
    ) -> Option<SpecialRate> {
        let params = &self.schedule.parameters;
        let included: Vec<usize> = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.included)
            .map(|(i, _)| i)
            .collect();

        if let Some(rate) = liability::minimum_annual_rate(params, facts) {
            let count = Decimal::from(included.len() as u64);
            let per_child = round_cents(rate / count);
            let mut remaining = rate;
            for (k, &idx) in included.iter().enumerate() {
                let amount = if k + 1 == included.len() { remaining } else { per_child };
                remaining -= amount;
                self.replace_liabilities(party, idx, amount, LiabilityBasis::MinimumAnnualRate, allowed, rows);
            }
            log::debug!("Minimum annual rate {rate} applies to {party}");
            return Some(SpecialRate::MinimumAnnualRate { annual_amount: rate });
        }

        if let Some((per_child, eligible)) = liability::fixed_annual_rate(params, facts) {
            for &k in &eligible {
                if let Some(&idx) = included.get(k) {
                    self.replace_liabilities(party, idx, per_child, LiabilityBasis::FixedAnnualRate, allowed, rows);
                }
            }
            let children = eligible.len() as u32;
            log::debug!("Fixed annual rate {per_child} per child applies to {party} for {children} children");
            return Some(SpecialRate::FixedAnnualRate {
                children,
                annual_amount: round_cents(per_child * Decimal::from(children)),
            });
        }
        None
    }

    fn replace_liabilities(
        &self,
        party: &PartyId,
        idx: usize,
        amount: Decimal,
        basis: LiabilityBasis,
        allowed: Option<&[PartyId]>,
        rows: &mut [ChildBreakdown],
    ) {
        let (Some(child), Some(row)) = (self.children.get(idx), rows.get_mut(idx)) else {
            return;
        };
        row.liabilities.retain(|l| &l.payer != party);
        let recipients = self.recipients(child, party, allowed);
        row.liabilities
            .extend(liability::split_between(party, amount, &recipients, basis));
    }

    // ------------------------------------------------------------------------
    // Formulas 5 and 6
    // ------------------------------------------------------------------------

    /// One parent's income only. Under Formula 5 the cost of the children is
    /// looked up at double that income and the resulting rate is halved.
    fn single_parent(&self, doubled: bool) -> AssessmentResult<Outcome> {
        let case = &self.snapshot.case;
        let available = case
            .parents()
            .into_iter()
            .find(|p| p.is_assessable())
            .ok_or_else(|| {
                AssessmentError::UnsupportedCaseShape(format!(
                    "case {} has no parent whose income can be assessed",
                    case.id
                ))
            })?;
        let case_ages = self.included_ages();
        let income = self.parent_income(available, false, &case_ages)?;
        let child_support_income = income.income.child_support_income;
        let cost_income = if doubled {
            child_support_income * Decimal::TWO
        } else {
            child_support_income
        };
        let (cost, total_cost, per_child) = self.cost_of_children(cost_income)?;
        let carers: Vec<PartyId> = case.carers.iter().map(|c| c.id.clone()).collect();
        let party = &available.id;

        let mut rows = Vec::with_capacity(self.children.len());
        for child in &self.children {
            if !child.included {
                rows.push(child.excluded_row());
                continue;
            }
            let cost_percentage = child.cost_percentage(party);
            let remaining = (HUNDRED - cost_percentage).max(Decimal::ZERO);
            let mut amount = apply_percentage(per_child, remaining);
            if doubled {
                amount = round_cents(amount / Decimal::TWO);
            }
            let (amount, basis) = self.capped(&income, child, cost_percentage, amount, case_ages.len())?;
            let recipients = self.recipients(child, party, Some(&carers));

            rows.push(ChildBreakdown {
                child_id: child.id.clone(),
                age: child.age,
                included: true,
                cost_of_child: per_child,
                care: child.care.clone(),
                child_support_percentages: vec![PartyPercentage {
                    party: party.clone(),
                    percentage: round_percentage(remaining),
                }],
                liabilities: liability::split_between(party, amount, &recipients, basis),
            });
        }

        let facts = RateEligibility {
            receives_income_support: available.receives_income_support,
            adjusted_taxable_income: income.income.adjusted_taxable_income,
            care_by_child: self
                .children
                .iter()
                .filter(|c| c.included)
                .map(|c| c.rounded_care(party))
                .collect(),
            formula_total: rows
                .iter()
                .flat_map(|r| r.liabilities.iter())
                .filter(|l| &l.payer == party)
                .map(|l| l.annual_amount)
                .sum(),
            other_active_cases: self.adjuster.active_other_cases(available, self.snapshot.period.start),
            other_case_children: income.other_ages.len(),
        };
        let special_rate = self.apply_special_rates(party, &facts, Some(&carers), &mut rows);

        let mut parents = Vec::with_capacity(2);
        for parent in case.parents() {
            if &parent.id == party {
                parents.push(ParentBreakdown {
                    party: party.clone(),
                    assessable: true,
                    income: income.income.clone(),
                    income_percentage: percentage_of(child_support_income, child_support_income),
                    cost_percentage: self.mean_cost_percentage(party),
                    special_rate: special_rate.clone(),
                });
            } else {
                parents.push(ParentBreakdown {
                    party: parent.id.clone(),
                    assessable: false,
                    income: NormalizedIncome {
                        adjusted_taxable_income: Decimal::ZERO,
                        self_support_amount: Decimal::ZERO,
                        relevant_dependent_allowance: Decimal::ZERO,
                        multi_case_allowance: Decimal::ZERO,
                        child_support_income: Decimal::ZERO,
                    },
                    income_percentage: Decimal::ZERO,
                    cost_percentage: self.mean_cost_percentage(&parent.id),
                    special_rate: None,
                });
            }
        }

        Ok(Outcome {
            parents,
            combined_income: child_support_income,
            cost,
            total_cost,
            children: rows,
        })
    }
}
