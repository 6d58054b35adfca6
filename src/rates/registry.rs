//! Published schedules keyed by financial year

use super::{loader, RateSchedule};
use crate::error::{AssessmentError, AssessmentResult, RatesError};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

/// Every published schedule. Schedules are added, never replaced.
#[derive(Debug, Clone, Default)]
pub struct RateRegistry {
    schedules: BTreeMap<u16, RateSchedule>,
}

impl RateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all year directories under `root`
    pub fn load_from_dir<P: AsRef<Path>>(root: P) -> Result<Self, RatesError> {
        let mut registry = Self::new();
        for schedule in loader::load_schedules(root)? {
            registry.publish(schedule)?;
        }
        Ok(registry)
    }

    /// Load from `CHILD_SUPPORT_RATES_DIR` or `data/rates`
    pub fn load_default() -> Result<Self, RatesError> {
        Self::load_from_dir(loader::default_rates_dir())
    }

    /// Publish a new year's schedule
    pub fn publish(&mut self, schedule: RateSchedule) -> Result<(), RatesError> {
        let year = schedule.year();
        if self.schedules.contains_key(&year) {
            return Err(RatesError::DuplicateYear(year));
        }
        let overlaps = self.schedules.values().any(|existing| {
            schedule.parameters.effective_from <= existing.parameters.effective_to
                && existing.parameters.effective_from <= schedule.parameters.effective_to
        });
        if overlaps {
            return Err(RatesError::Invalid(format!(
                "schedule {year} overlaps the dates of an existing schedule"
            )));
        }
        log::info!("Published rate schedule for {year}");
        self.schedules.insert(year, schedule);
        Ok(())
    }

    pub fn for_year(&self, year: u16) -> AssessmentResult<&RateSchedule> {
        self.schedules
            .get(&year)
            .ok_or_else(|| AssessmentError::RatesUnavailable(format!("financial year {year}")))
    }

    /// Schedule in force on `date`
    pub fn for_date(&self, date: NaiveDate) -> AssessmentResult<&RateSchedule> {
        self.schedules
            .values()
            .find(|s| s.covers(date))
            .ok_or_else(|| AssessmentError::RatesUnavailable(format!("date {date}")))
    }

    pub fn years(&self) -> Vec<u16> {
        self.schedules.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::fixtures::{bundled_registry, bundled_schedule};

    #[test]
    fn test_lookup_by_year_and_date() {
        let registry = bundled_registry();
        assert_eq!(registry.years(), vec![2025, 2026]);
        assert_eq!(registry.for_year(2025).unwrap().year(), 2025);
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        assert_eq!(registry.for_date(date).unwrap().year(), 2026);
    }

    #[test]
    fn test_unknown_year() {
        let registry = bundled_registry();
        assert!(matches!(
            registry.for_year(2031),
            Err(AssessmentError::RatesUnavailable(_))
        ));
    }

    #[test]
    fn test_republishing_a_year_rejected() {
        let mut registry = bundled_registry();
        match registry.publish(bundled_schedule(2026)) {
            Err(RatesError::DuplicateYear(2026)) => {}
            other => panic!("expected DuplicateYear, got {other:?}"),
        }
    }
}
