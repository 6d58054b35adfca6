//! Case data structures, validation and snapshot loading

mod data;
pub mod loader;
pub mod validate;

pub use data::{
    age_on, AssessmentPeriod, BindingDetermination, Case, CaseId, CaseSnapshot, Child,
    Jurisdiction, NonParentCarer, OtherCase, OtherCaseChild, Parent, PartyId, RelevantDependent,
};
pub use loader::{load_snapshot, load_snapshots, load_snapshots_from_reader};
pub use validate::validate_snapshot;

#[cfg(test)]
pub(crate) mod fixtures {
    //! Snapshot builders shared by unit tests

    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn parent(id: &str, income: i64) -> Parent {
        Parent {
            id: PartyId::new(id),
            taxable_income: Decimal::from(income),
            reportable_fringe_benefits: Decimal::ZERO,
            reportable_super_contributions: Decimal::ZERO,
            other_prescribed_amounts: Decimal::ZERO,
            estimate_of_income: None,
            deemed_income: None,
            receives_income_support: false,
            relevant_dependents: Vec::new(),
            other_cases: Vec::new(),
            jurisdiction: Jurisdiction::Reciprocating,
            deceased: false,
        }
    }

    pub fn child(id: &str, date_of_birth: NaiveDate, care: &[(&str, u32)]) -> Child {
        let care_nights: BTreeMap<PartyId, u32> = care
            .iter()
            .map(|(party, nights)| (PartyId::new(*party), *nights))
            .collect();
        Child {
            id: id.to_string(),
            date_of_birth,
            care_nights,
        }
    }

    /// One eight-year-old child, parents "A" and "B", calendar 2026
    pub fn two_parent_snapshot(income_a: i64, income_b: i64, nights_a: u32, nights_b: u32) -> CaseSnapshot {
        CaseSnapshot {
            case: Case {
                id: CaseId::new("C-1"),
                parent_a: parent("A", income_a),
                parent_b: parent("B", income_b),
                carers: Vec::new(),
                children: vec![child("k1", date(2018, 1, 1), &[("A", nights_a), ("B", nights_b)])],
                binding_determination: None,
            },
            period: AssessmentPeriod::new(date(2026, 1, 1), date(2026, 12, 31)),
            financial_year: Some(2026),
        }
    }
}
