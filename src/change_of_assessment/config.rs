//! Review timings and thresholds

use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Days a party has to supply outstanding evidence
    #[serde(default = "default_window_days")]
    pub evidence_window_days: u32,

    /// Days either party has to object to a decision
    #[serde(default = "default_window_days")]
    pub objection_window_days: u32,

    /// How far before lodgement a change may take effect
    #[serde(default = "default_retrospective_months")]
    pub retrospective_months: u32,

    /// The same limit when leave has been granted
    #[serde(default = "default_extended_months")]
    pub extended_retrospective_months: u32,

    /// Greatest gap between an income reduction and a new relationship
    /// for the two to count as correlated
    #[serde(default = "default_correlation_days")]
    pub correlation_window_days: u32,

    /// Costs below this percentage of the cost of the children are not significant
    #[serde(default = "default_significant_cost")]
    pub significant_cost_percentage: Decimal,
}

fn default_window_days() -> u32 { 28 }
fn default_retrospective_months() -> u32 { 18 }
fn default_extended_months() -> u32 { 84 }
fn default_correlation_days() -> u32 { 365 }
fn default_significant_cost() -> Decimal { Decimal::from(5) }

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            evidence_window_days: default_window_days(),
            objection_window_days: default_window_days(),
            retrospective_months: default_retrospective_months(),
            extended_retrospective_months: default_extended_months(),
            correlation_window_days: default_correlation_days(),
            significant_cost_percentage: default_significant_cost(),
        }
    }
}

impl ReviewConfig {
    /// Earliest date of effect for an application lodged on `lodged_on`
    pub fn earliest_date_of_effect(&self, lodged_on: NaiveDate, leave_granted: bool) -> Option<NaiveDate> {
        let months = if leave_granted {
            self.extended_retrospective_months
        } else {
            self.retrospective_months
        };
        lodged_on.checked_sub_months(Months::new(months))
    }

    pub fn evidence_deadline(&self, from: NaiveDate) -> Option<NaiveDate> {
        from.checked_add_days(Days::new(u64::from(self.evidence_window_days)))
    }

    pub fn objection_deadline(&self, from: NaiveDate) -> Option<NaiveDate> {
        from.checked_add_days(Days::new(u64::from(self.objection_window_days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let config: ReviewConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReviewConfig::default());
        assert_eq!(config.evidence_window_days, 28);
        assert_eq!(config.significant_cost_percentage, Decimal::from(5));
    }

    #[test]
    fn test_retrospective_limits() {
        let config = ReviewConfig::default();
        assert_eq!(config.earliest_date_of_effect(date(2026, 7, 1), false), Some(date(2025, 1, 1)));
        assert_eq!(config.earliest_date_of_effect(date(2026, 7, 1), true), Some(date(2019, 7, 1)));
    }

    #[test]
    fn test_deadlines() {
        let config = ReviewConfig::default();
        assert_eq!(config.evidence_deadline(date(2026, 3, 1)), Some(date(2026, 3, 29)));
        assert_eq!(config.objection_deadline(date(2026, 12, 20)), Some(date(2027, 1, 17)));
    }
}
