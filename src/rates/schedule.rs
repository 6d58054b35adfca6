//! Rate schedule for one financial year

use super::{CareCostTable, CostsOfChildrenTable};
use crate::error::RatesError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Scalar parameters published each year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleParameters {
    pub financial_year: u16,

    /// First day the schedule applies to
    pub effective_from: NaiveDate,

    /// Last day the schedule applies to (inclusive)
    pub effective_to: NaiveDate,

    /// Income presumed necessary for a parent's own upkeep
    pub self_support_amount: Decimal,

    /// Maximum Parenting Payment (single) rate, the fixed annual rate income test
    pub max_parenting_payment_single: Decimal,

    pub minimum_annual_rate: Decimal,

    pub fixed_annual_rate: Decimal,

    /// Indexation factor relative to the 2025 schedule
    pub cpi_index: Decimal,

    /// Below this care percentage a parent has less than regular care
    #[serde(default = "default_regular_care")]
    pub regular_care_threshold: u8,

    /// Care needed to receive payment for a child
    #[serde(default = "default_shared_care")]
    pub shared_care_threshold: u8,

    #[serde(default = "default_older_child_age")]
    pub older_child_age: u32,

    /// Children this age or over are excluded from the assessment
    #[serde(default = "default_adult_age")]
    pub adult_age: u32,

    #[serde(default = "default_three")]
    pub fixed_rate_child_limit: u32,

    #[serde(default = "default_three")]
    pub minimum_rate_case_limit: u32,

    /// Highest cost percentage any care level may produce
    #[serde(default = "default_cost_ceiling")]
    pub cost_percentage_ceiling: Decimal,
}

fn default_regular_care() -> u8 { 14 }
fn default_shared_care() -> u8 { 35 }
fn default_older_child_age() -> u32 { 13 }
fn default_adult_age() -> u32 { 18 }
fn default_three() -> u32 { 3 }
fn default_cost_ceiling() -> Decimal { Decimal::ONE_HUNDRED }

/// Parameters and tables for one financial year
#[derive(Debug, Clone)]
pub struct RateSchedule {
    pub parameters: ScheduleParameters,
    pub costs: CostsOfChildrenTable,
    pub care: CareCostTable,
}

impl RateSchedule {
    pub fn new(
        parameters: ScheduleParameters,
        costs: CostsOfChildrenTable,
        care: CareCostTable,
    ) -> Result<Self, RatesError> {
        let p = &parameters;
        if p.effective_to < p.effective_from {
            return Err(RatesError::Invalid(format!(
                "schedule {} ends before it starts",
                p.financial_year
            )));
        }
        let amounts = [
            p.self_support_amount,
            p.max_parenting_payment_single,
            p.minimum_annual_rate,
            p.fixed_annual_rate,
            p.cpi_index,
        ];
        if amounts.iter().any(|a| *a < Decimal::ZERO) {
            return Err(RatesError::Invalid(format!(
                "schedule {} has a negative amount",
                p.financial_year
            )));
        }
        if p.regular_care_threshold > p.shared_care_threshold || p.shared_care_threshold > 100 {
            return Err(RatesError::Invalid(format!(
                "schedule {} has inconsistent care thresholds",
                p.financial_year
            )));
        }
        Ok(Self {
            parameters,
            costs,
            care,
        })
    }

    pub fn year(&self) -> u16 {
        self.parameters.financial_year
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.parameters.effective_from && date <= self.parameters.effective_to
    }

    pub fn self_support_amount(&self) -> Decimal {
        self.parameters.self_support_amount
    }

    /// Summary of the figures an assessment relied on
    pub fn rates_applied(&self) -> RatesApplied {
        let p = &self.parameters;
        RatesApplied {
            financial_year: p.financial_year,
            self_support_amount: p.self_support_amount,
            minimum_annual_rate: p.minimum_annual_rate,
            fixed_annual_rate: p.fixed_annual_rate,
            cpi_index: p.cpi_index,
        }
    }
}

/// Rate figures recorded on an assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesApplied {
    pub financial_year: u16,
    pub self_support_amount: Decimal,
    pub minimum_annual_rate: Decimal,
    pub fixed_annual_rate: Decimal,
    pub cpi_index: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::fixtures::bundled_schedule;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bundled_2026_parameters() {
        let schedule = bundled_schedule(2026);
        assert_eq!(schedule.year(), 2026);
        assert_eq!(schedule.self_support_amount(), dec!(31046));
        assert_eq!(schedule.parameters.minimum_annual_rate, dec!(551));
        assert_eq!(schedule.parameters.fixed_annual_rate, dec!(1825));
        assert_eq!(schedule.parameters.shared_care_threshold, 35);
    }

    #[test]
    fn test_covers_effective_dates() {
        let schedule = bundled_schedule(2025);
        assert!(schedule.covers(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(schedule.covers(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()));
        assert!(!schedule.covers(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let base = bundled_schedule(2026);
        let mut parameters = base.parameters.clone();
        parameters.fixed_annual_rate = dec!(-1);
        assert!(RateSchedule::new(parameters, base.costs.clone(), base.care.clone()).is_err());
    }
}
