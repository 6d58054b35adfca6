//! Formula assessment: care conversion, income normalization, multi-case
//! adjustment, formula selection and liability

mod calculator;
pub mod care;
mod formula;
pub mod income;
pub mod liability;
pub mod multi_case;
mod record;

pub use calculator::{AssessmentCalculator, AssessmentOverrides};
pub use care::{care_percentage, round_care, CareShare, CareToCostConverter};
pub use formula::{Formula, FormulaSelector};
pub use income::{IncomeNormalizer, IncomeOverride, NormalizedIncome};
pub use multi_case::{validate_case_links, validate_portfolio, MultiCaseAdjuster};
pub use record::{
    Assessment, AssessmentId, ChildBreakdown, ChildLiability, LiabilityBasis, ParentBreakdown,
    PartyPercentage, Payment, PeriodicAmounts, SpecialRate,
};
