//! Care-to-cost band table
//!
//! Bands cover whole-number care percentages. Each band is half-open
//! `[care_from, care_to)` except the last, which is closed at 100%.

use crate::error::RatesError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a band turns a care percentage into a cost percentage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandRule {
    /// Same cost percentage across the band
    Fixed { cost: Decimal },
    /// `base + slope * (care - care_from)`
    Linear { base: Decimal, slope: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CareBand {
    pub care_from: u8,
    pub care_to: u8,
    pub rule: BandRule,
}

impl CareBand {
    fn value_at(&self, care: u8) -> Decimal {
        match self.rule {
            BandRule::Fixed { cost } => cost,
            BandRule::Linear { base, slope } => {
                base + slope * Decimal::from(care.saturating_sub(self.care_from))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Fixed,
    Linear,
}

/// One CSV row of the band table
#[derive(Debug, Clone, Deserialize)]
pub struct CareBandRow {
    pub care_from: u8,
    pub care_to: u8,
    pub rule: RuleKind,
    pub base: Decimal,
    #[serde(default)]
    pub slope: Decimal,
}

impl From<&CareBandRow> for CareBand {
    fn from(row: &CareBandRow) -> Self {
        let rule = match row.rule {
            RuleKind::Fixed => BandRule::Fixed { cost: row.base },
            RuleKind::Linear => BandRule::Linear {
                base: row.base,
                slope: row.slope,
            },
        };
        CareBand {
            care_from: row.care_from,
            care_to: row.care_to,
            rule,
        }
    }
}

/// Validated band table with its cost ceiling
#[derive(Debug, Clone)]
pub struct CareCostTable {
    bands: Vec<CareBand>,
    ceiling: Decimal,
}

impl CareCostTable {
    /// Build a table, rejecting gaps, overlaps and decreasing steps
    pub fn new(mut bands: Vec<CareBand>, ceiling: Decimal) -> Result<Self, RatesError> {
        bands.sort_by_key(|b| b.care_from);

        let (Some(first), Some(last)) = (bands.first(), bands.last()) else {
            return Err(RatesError::Invalid("care band table is empty".to_string()));
        };
        if first.care_from != 0 {
            return Err(RatesError::Invalid("care bands must start at 0%".to_string()));
        }
        if last.care_to != 100 {
            return Err(RatesError::Invalid("care bands must end at 100%".to_string()));
        }
        if first.value_at(0) != Decimal::ZERO {
            return Err(RatesError::Invalid("0% care must map to 0% cost".to_string()));
        }
        if ceiling < Decimal::ZERO {
            return Err(RatesError::Invalid("cost ceiling is negative".to_string()));
        }

        for (i, band) in bands.iter().enumerate() {
            if band.care_from >= band.care_to {
                return Err(RatesError::Invalid(format!(
                    "care band [{}, {}) is empty",
                    band.care_from, band.care_to
                )));
            }
            if let BandRule::Linear { slope, .. } = band.rule {
                if slope < Decimal::ZERO {
                    return Err(RatesError::Invalid(format!(
                        "care band [{}, {}) decreases",
                        band.care_from, band.care_to
                    )));
                }
            }
            if let Some(next) = bands.get(i + 1) {
                if next.care_from != band.care_to {
                    return Err(RatesError::Invalid(format!(
                        "care bands do not meet at {}%",
                        band.care_to
                    )));
                }
                if band.value_at(band.care_to - 1) > next.value_at(next.care_from) {
                    return Err(RatesError::Invalid(format!(
                        "cost percentage falls at {}% care",
                        next.care_from
                    )));
                }
            }
        }

        Ok(Self { bands, ceiling })
    }

    /// Create from loaded CSV rows
    pub fn from_loaded(rows: &[CareBandRow], ceiling: Decimal) -> Result<Self, RatesError> {
        Self::new(rows.iter().map(CareBand::from).collect(), ceiling)
    }

    pub fn bands(&self) -> &[CareBand] {
        &self.bands
    }

    pub fn ceiling(&self) -> Decimal {
        self.ceiling
    }

    /// Cost percentage for a whole-number care percentage
    pub fn cost_percentage(&self, care: u8) -> Decimal {
        let care = care.min(100);
        let band = self
            .bands
            .iter()
            .find(|b| care >= b.care_from && care < b.care_to)
            .or_else(|| self.bands.last());

        match band {
            Some(band) => band.value_at(care).min(self.ceiling),
            None => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::fixtures::bundled_schedule;
    use rust_decimal_macros::dec;

    #[test]
    fn test_official_bands() {
        let care = bundled_schedule(2026).care;
        assert_eq!(care.cost_percentage(0), dec!(0));
        assert_eq!(care.cost_percentage(13), dec!(0));
        assert_eq!(care.cost_percentage(14), dec!(24));
        assert_eq!(care.cost_percentage(34), dec!(24));
        assert_eq!(care.cost_percentage(35), dec!(25));
        assert_eq!(care.cost_percentage(40), dec!(35));
        assert_eq!(care.cost_percentage(47), dec!(49));
        assert_eq!(care.cost_percentage(50), dec!(50));
        assert_eq!(care.cost_percentage(53), dec!(51));
        assert_eq!(care.cost_percentage(65), dec!(75));
        assert_eq!(care.cost_percentage(66), dec!(76));
        assert_eq!(care.cost_percentage(87), dec!(100));
        assert_eq!(care.cost_percentage(100), dec!(100));
    }

    #[test]
    fn test_monotone_over_all_care() {
        let care = bundled_schedule(2025).care;
        let mut previous = Decimal::ZERO;
        for pct in 0..=100u8 {
            let cost = care.cost_percentage(pct);
            assert!(cost >= previous, "cost fell at {pct}%");
            previous = cost;
        }
    }

    #[test]
    fn test_ceiling_above_hundred_is_configurable() {
        let bands = vec![
            CareBand { care_from: 0, care_to: 14, rule: BandRule::Fixed { cost: dec!(0) } },
            CareBand { care_from: 14, care_to: 87, rule: BandRule::Linear { base: dec!(24), slope: dec!(1) } },
            CareBand { care_from: 87, care_to: 100, rule: BandRule::Fixed { cost: dec!(117) } },
        ];
        let table = CareCostTable::new(bands, dec!(117)).unwrap();
        assert_eq!(table.cost_percentage(100), dec!(117));
        assert_eq!(table.cost_percentage(0), dec!(0));
    }

    #[test]
    fn test_ceiling_caps_band_values() {
        let bands = vec![
            CareBand { care_from: 0, care_to: 50, rule: BandRule::Fixed { cost: dec!(0) } },
            CareBand { care_from: 50, care_to: 100, rule: BandRule::Linear { base: dec!(50), slope: dec!(3) } },
        ];
        let table = CareCostTable::new(bands, dec!(100)).unwrap();
        assert_eq!(table.cost_percentage(90), dec!(100));
    }

    #[test]
    fn test_decreasing_step_rejected() {
        let bands = vec![
            CareBand { care_from: 0, care_to: 50, rule: BandRule::Linear { base: dec!(0), slope: dec!(2) } },
            CareBand { care_from: 50, care_to: 100, rule: BandRule::Fixed { cost: dec!(60) } },
        ];
        assert!(CareCostTable::new(bands, dec!(100)).is_err());
    }

    #[test]
    fn test_gap_rejected() {
        let bands = vec![
            CareBand { care_from: 0, care_to: 40, rule: BandRule::Fixed { cost: dec!(0) } },
            CareBand { care_from: 50, care_to: 100, rule: BandRule::Fixed { cost: dec!(100) } },
        ];
        assert!(CareCostTable::new(bands, dec!(100)).is_err());
    }

    #[test]
    fn test_nonzero_start_rejected() {
        let bands = vec![CareBand { care_from: 0, care_to: 100, rule: BandRule::Fixed { cost: dec!(5) } }];
        assert!(CareCostTable::new(bands, dec!(100)).is_err());
    }
}
