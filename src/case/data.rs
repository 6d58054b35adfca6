//! Case snapshot structures supplied by the surrounding application

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a parent or non-parent carer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a child support case
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a parent lives, for reporting and formula purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jurisdiction {
    /// Resident, or overseas in a reciprocating jurisdiction
    #[default]
    Reciprocating,
    /// Overseas in a jurisdiction excluded from reciprocal arrangements
    Excluded,
    /// Overseas in a jurisdiction with no reciprocal arrangement
    NonReciprocating,
}

impl Jurisdiction {
    /// Income can be reported through the standard channels
    pub fn reports_income(&self) -> bool {
        matches!(self, Jurisdiction::Reciprocating)
    }
}

/// A person the parent has a legal duty to support outside this case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantDependent {
    pub date_of_birth: NaiveDate,
}

/// A child in one of the parent's other cases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherCaseChild {
    pub date_of_birth: NaiveDate,
}

/// Reference to another active case the parent belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherCase {
    pub case_id: CaseId,
    /// The other party in that case, when known
    #[serde(default)]
    pub other_party: Option<PartyId>,
    pub children: Vec<OtherCaseChild>,
}

/// Parent record for one assessment period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parent {
    pub id: PartyId,

    /// Taxable income as last reported
    pub taxable_income: Decimal,

    #[serde(default)]
    pub reportable_fringe_benefits: Decimal,

    #[serde(default)]
    pub reportable_super_contributions: Decimal,

    /// Net investment losses, tax-free pensions and similar
    #[serde(default)]
    pub other_prescribed_amounts: Decimal,

    /// Replaces the reported taxable income for the rest of the period
    #[serde(default)]
    pub estimate_of_income: Option<Decimal>,

    /// Administratively deemed income, used when income cannot be reported
    #[serde(default)]
    pub deemed_income: Option<Decimal>,

    #[serde(default)]
    pub receives_income_support: bool,

    #[serde(default)]
    pub relevant_dependents: Vec<RelevantDependent>,

    #[serde(default)]
    pub other_cases: Vec<OtherCase>,

    #[serde(default)]
    pub jurisdiction: Jurisdiction,

    #[serde(default)]
    pub deceased: bool,
}

impl Parent {
    /// Parent whose income can be used directly by the formula
    pub fn is_assessable(&self) -> bool {
        !self.deceased && self.jurisdiction.reports_income()
    }

    pub fn has_other_cases(&self) -> bool {
        !self.other_cases.is_empty()
    }
}

/// Grandparent, relative or other carer who is not a parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonParentCarer {
    pub id: PartyId,
}

/// Child in the case with nights of care per party for the period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub date_of_birth: NaiveDate,
    pub care_nights: BTreeMap<PartyId, u32>,
}

impl Child {
    pub fn nights_with(&self, party: &PartyId) -> u32 {
        self.care_nights.get(party).copied().unwrap_or(0)
    }

    pub fn age_on(&self, date: NaiveDate) -> u32 {
        age_on(self.date_of_birth, date)
    }
}

/// Court order or binding agreement displacing the formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingDetermination {
    CourtOrder { reference: String },
    BindingAgreement { reference: String },
}

impl BindingDetermination {
    pub fn label(&self) -> &'static str {
        match self {
            BindingDetermination::CourtOrder { .. } => "court order",
            BindingDetermination::BindingAgreement { .. } => "binding agreement",
        }
    }
}

/// A child support case between two parents, optionally with non-parent carers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub parent_a: Parent,
    pub parent_b: Parent,
    #[serde(default)]
    pub carers: Vec<NonParentCarer>,
    pub children: Vec<Child>,
    #[serde(default)]
    pub binding_determination: Option<BindingDetermination>,
}

impl Case {
    pub fn parents(&self) -> [&Parent; 2] {
        [&self.parent_a, &self.parent_b]
    }

    pub fn parent(&self, id: &PartyId) -> Option<&Parent> {
        self.parents().into_iter().find(|p| &p.id == id)
    }

    /// Every party able to hold care: both parents then carers
    pub fn party_ids(&self) -> Vec<PartyId> {
        let mut ids = vec![self.parent_a.id.clone(), self.parent_b.id.clone()];
        ids.extend(self.carers.iter().map(|c| c.id.clone()));
        ids
    }

    pub fn has_non_parent_carer(&self) -> bool {
        !self.carers.is_empty()
    }
}

/// Inclusive date range the assessment covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AssessmentPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// 1 January to 31 December of `year`
    pub fn calendar_year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    /// Days covered, counting both ends
    pub fn days(&self) -> u32 {
        let span = (self.end - self.start).num_days() + 1;
        u32::try_from(span).unwrap_or(0)
    }
}

/// Everything the calculator needs for one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSnapshot {
    pub case: Case,
    pub period: AssessmentPeriod,
    /// Explicit schedule year; otherwise chosen by the period start date
    #[serde(default)]
    pub financial_year: Option<u16>,
}

/// Age in whole years on `date`
pub fn age_on(date_of_birth: NaiveDate, date: NaiveDate) -> u32 {
    if date < date_of_birth {
        return 0;
    }
    let mut years = date.year() - date_of_birth.year();
    if (date.month(), date.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let dob = date(2013, 3, 15);
        assert_eq!(age_on(dob, date(2026, 3, 14)), 12);
        assert_eq!(age_on(dob, date(2026, 3, 15)), 13);
        assert_eq!(age_on(dob, date(2012, 1, 1)), 0);
    }

    #[test]
    fn test_leap_year_period_days() {
        let period = AssessmentPeriod::calendar_year(2028).unwrap();
        assert_eq!(period.days(), 366);
        let period = AssessmentPeriod::calendar_year(2026).unwrap();
        assert_eq!(period.days(), 365);
    }

    #[test]
    fn test_jurisdiction_reporting() {
        assert!(Jurisdiction::Reciprocating.reports_income());
        assert!(!Jurisdiction::Excluded.reports_income());
        assert!(!Jurisdiction::NonReciprocating.reports_income());
    }

    #[test]
    fn test_case_snapshot_deserializes_with_defaults() {
        let json = r#"{
            "case": {
                "id": "C-1",
                "parent_a": { "id": "A", "taxable_income": "80000" },
                "parent_b": { "id": "B", "taxable_income": 50000 },
                "children": [
                    { "id": "k1", "date_of_birth": "2018-05-01", "care_nights": { "B": 365 } }
                ]
            },
            "period": { "start": "2026-01-01", "end": "2026-12-31" }
        }"#;
        let snapshot: CaseSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.case.parent_a.taxable_income, Decimal::from(80000));
        assert_eq!(snapshot.case.parent_b.jurisdiction, Jurisdiction::Reciprocating);
        assert!(snapshot.case.carers.is_empty());
        assert_eq!(snapshot.case.children[0].nights_with(&PartyId::new("B")), 365);
        assert_eq!(snapshot.financial_year, None);
    }
}
