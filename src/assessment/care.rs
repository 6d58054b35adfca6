//! Care-to-cost conversion
//!
//! Nights of care become a care percentage, rounded to a whole number
//! (down below 50%, up from 50%), then a cost percentage via the band table.

use crate::case::PartyId;
use crate::error::{AssessmentError, AssessmentResult};
use crate::money::{round_percentage, HUNDRED};
use crate::rates::CareCostTable;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One party's care of one child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareShare {
    pub party: PartyId,
    pub nights: u32,
    /// Exact share of the period, 2 dp
    pub care_percentage: Decimal,
    /// Whole-number care used for the band lookup
    pub rounded_care: u8,
    pub cost_percentage: Decimal,
}

pub struct CareToCostConverter<'a> {
    table: &'a CareCostTable,
}

impl<'a> CareToCostConverter<'a> {
    pub fn new(table: &'a CareCostTable) -> Self {
        Self { table }
    }

    pub fn convert(&self, party: &PartyId, nights: u32, days: u32) -> AssessmentResult<CareShare> {
        let exact = care_percentage(nights, days)?;
        let rounded = round_care(exact);
        Ok(CareShare {
            party: party.clone(),
            nights,
            care_percentage: round_percentage(exact),
            rounded_care: rounded,
            cost_percentage: self.table.cost_percentage(rounded),
        })
    }
}

/// Unrounded share of the period spent in a party's care
pub fn care_percentage(nights: u32, days: u32) -> AssessmentResult<Decimal> {
    if days == 0 {
        return Err(AssessmentError::InvalidInput("assessment period has no days".to_string()));
    }
    if nights > days {
        return Err(AssessmentError::InvalidInput(format!(
            "{nights} nights of care outside [0, {days}]"
        )));
    }
    Ok(Decimal::from(nights) * HUNDRED / Decimal::from(days))
}

/// Whole-number care: round down below 50%, round up from 50%
pub fn round_care(exact: Decimal) -> u8 {
    let rounded = if exact < Decimal::from(50) {
        exact.floor()
    } else {
        exact.ceil()
    };
    rounded.to_u8().unwrap_or(100).min(100)
}
