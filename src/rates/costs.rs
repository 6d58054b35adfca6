//! Costs of Children table
//!
//! Stepped income brackets keyed by age group and number of children. Each
//! bracket carries a base amount and a marginal rate applied to income above
//! the bracket floor. The top bracket is open-ended, so income above the
//! published brackets continues at that bracket's marginal rate (zero in the
//! published tables, which caps the cost).

use crate::error::{AssessmentError, AssessmentResult, RatesError};
use crate::money::round_cents;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Age group of the children in the case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    /// All children under the older-child age
    #[serde(rename = "under_13")]
    Younger,
    /// All children at or above the older-child age
    #[serde(rename = "13_plus")]
    Older,
    /// Children on both sides of the older-child age
    #[serde(rename = "mixed")]
    Mixed,
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgeGroup::Younger => "under 13",
            AgeGroup::Older => "13 and over",
            AgeGroup::Mixed => "mixed ages",
        };
        f.write_str(label)
    }
}

/// Table rows are published for 1, 2 and "3 or more" children
pub const MAX_TABLE_CHILDREN: u8 = 3;

/// Classify a set of child ages into the table key.
/// Returns None when there are no children.
pub fn classify_children(ages: &[u32], older_child_age: u32) -> Option<(AgeGroup, u8)> {
    if ages.is_empty() {
        return None;
    }
    let older = ages.iter().filter(|&&age| age >= older_child_age).count();
    let younger = ages.len() - older;

    let group = match (younger, older) {
        (_, 0) => AgeGroup::Younger,
        (0, _) => AgeGroup::Older,
        _ => AgeGroup::Mixed,
    };
    let count = u8::try_from(ages.len()).unwrap_or(u8::MAX).min(MAX_TABLE_CHILDREN);
    Some((group, count))
}

/// One CSV row of the table
#[derive(Debug, Clone, Deserialize)]
pub struct CostRow {
    pub age_group: AgeGroup,
    pub children: u8,
    pub floor: Decimal,
    /// Empty for the open top bracket
    pub ceiling: Option<Decimal>,
    pub base: Decimal,
    pub marginal_rate: Decimal,
}

/// A single income bracket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBracket {
    pub floor: Decimal,
    pub ceiling: Option<Decimal>,
    pub base: Decimal,
    pub marginal_rate: Decimal,
}

impl CostBracket {
    fn contains(&self, income: Decimal) -> bool {
        self.ceiling.map_or(true, |ceiling| income <= ceiling)
    }

    fn cost_at(&self, income: Decimal) -> Decimal {
        let above_floor = (income - self.floor).max(Decimal::ZERO);
        round_cents(self.base + above_floor * self.marginal_rate)
    }
}

/// Result of a table lookup, kept for the assessment breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOfChildren {
    pub age_group: AgeGroup,
    pub children: u8,
    pub income: Decimal,
    pub bracket: CostBracket,
    pub total: Decimal,
}

/// Costs of Children table for one financial year
#[derive(Debug, Clone)]
pub struct CostsOfChildrenTable {
    brackets: BTreeMap<(AgeGroup, u8), Vec<CostBracket>>,
}

impl CostsOfChildrenTable {
    /// Create from loaded CSV rows, checking the bracket structure
    pub fn from_loaded(rows: &[CostRow]) -> Result<Self, RatesError> {
        let mut brackets: BTreeMap<(AgeGroup, u8), Vec<CostBracket>> = BTreeMap::new();
        for row in rows {
            if row.children == 0 || row.children > MAX_TABLE_CHILDREN {
                return Err(RatesError::Invalid(format!(
                    "costs of children row for {} children; expected 1 to {MAX_TABLE_CHILDREN}",
                    row.children
                )));
            }
            brackets
                .entry((row.age_group, row.children))
                .or_default()
                .push(CostBracket {
                    floor: row.floor,
                    ceiling: row.ceiling,
                    base: row.base,
                    marginal_rate: row.marginal_rate,
                });
        }

        for (key, list) in brackets.iter_mut() {
            list.sort_by(|a, b| a.floor.cmp(&b.floor));
            validate_brackets(*key, list)?;
        }

        let required = [
            (AgeGroup::Younger, 1),
            (AgeGroup::Younger, 2),
            (AgeGroup::Younger, 3),
            (AgeGroup::Older, 1),
            (AgeGroup::Older, 2),
            (AgeGroup::Older, 3),
            (AgeGroup::Mixed, 2),
            (AgeGroup::Mixed, 3),
        ];
        for key in required {
            if !brackets.contains_key(&key) {
                return Err(RatesError::Invalid(format!(
                    "costs of children table has no rows for {} with {} children",
                    key.0, key.1
                )));
            }
        }

        Ok(Self { brackets })
    }

    /// Brackets for a key, lowest first
    pub fn brackets(&self, group: AgeGroup, children: u8) -> Option<&[CostBracket]> {
        self.brackets.get(&(group, children)).map(|v| v.as_slice())
    }

    /// Annual cost of the children for a combined child support income.
    ///
    /// Picks the single bracket containing the income; there is no blending
    /// between neighbouring rows. Income below the lowest floor uses the
    /// bottom row.
    pub fn cost_of_children(
        &self,
        income: Decimal,
        group: AgeGroup,
        children: u8,
    ) -> AssessmentResult<CostOfChildren> {
        // Mixed ages with a single child cannot occur; fall back to the younger rows
        let group = if group == AgeGroup::Mixed && children < 2 {
            AgeGroup::Younger
        } else {
            group
        };
        let children = children.min(MAX_TABLE_CHILDREN);

        let list = self.brackets(group, children).ok_or_else(|| {
            AssessmentError::RatesUnavailable(format!(
                "costs of children for {group} with {children} children"
            ))
        })?;
        let bracket = list
            .iter()
            .find(|b| b.contains(income))
            .or_else(|| list.last())
            .ok_or_else(|| {
                AssessmentError::RatesUnavailable(format!(
                    "empty costs of children bracket list for {group}"
                ))
            })?;

        Ok(CostOfChildren {
            age_group: group,
            children,
            income,
            bracket: bracket.clone(),
            total: bracket.cost_at(income),
        })
    }
}

fn validate_brackets(key: (AgeGroup, u8), list: &[CostBracket]) -> Result<(), RatesError> {
    let label = format!("{} / {} children", key.0, key.1);
    let Some(last) = list.last() else {
        return Err(RatesError::Invalid(format!("{label}: no brackets")));
    };
    if last.ceiling.is_some() {
        return Err(RatesError::Invalid(format!("{label}: top bracket must be open-ended")));
    }

    for (i, bracket) in list.iter().enumerate() {
        if bracket.marginal_rate < Decimal::ZERO || bracket.base < Decimal::ZERO {
            return Err(RatesError::Invalid(format!("{label}: negative base or rate")));
        }
        if i + 1 < list.len() {
            let Some(ceiling) = bracket.ceiling else {
                return Err(RatesError::Invalid(format!(
                    "{label}: only the top bracket may be open-ended"
                )));
            };
            if ceiling <= bracket.floor {
                return Err(RatesError::Invalid(format!(
                    "{label}: bracket ceiling {ceiling} not above floor {}",
                    bracket.floor
                )));
            }
            if list[i + 1].floor != ceiling {
                return Err(RatesError::Invalid(format!(
                    "{label}: gap between {ceiling} and {}",
                    list[i + 1].floor
                )));
            }
        }
    }
    Ok(())
}
