//! End-to-end formula scenarios against the bundled rate schedules

use child_support_system::assessment::validate_portfolio;
use child_support_system::case::{load_snapshots, Case, CaseSnapshot, OtherCase, OtherCaseChild};
use child_support_system::{AssessmentCalculator, CaseId, Formula, PartyId, RateRegistry};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

fn calculator() -> AssessmentCalculator {
    let registry = RateRegistry::load_from_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/data/rates")).unwrap();
    AssessmentCalculator::new(Arc::new(registry))
}

fn snapshot(income_a: u32, income_b: u32, nights_a: u32, nights_b: u32) -> CaseSnapshot {
    serde_json::from_value(json!({
        "case": {
            "id": "G-1",
            "parent_a": { "id": "A", "taxable_income": income_a },
            "parent_b": { "id": "B", "taxable_income": income_b },
            "children": [
                { "id": "k1", "date_of_birth": "2018-01-01", "care_nights": { "A": nights_a, "B": nights_b } }
            ]
        },
        "period": { "start": "2026-01-01", "end": "2026-12-31" },
        "financial_year": 2026
    }))
    .unwrap()
}

fn a() -> PartyId {
    PartyId::new("A")
}

fn b() -> PartyId {
    PartyId::new("B")
}

#[test]
fn test_golden_sole_care() {
    let assessment = calculator().assess(&snapshot(80000, 50000, 0, 365)).unwrap();

    assert_eq!(assessment.formula, Formula::Standard);
    assert_eq!(assessment.combined_child_support_income, dec!(67908));
    assert_eq!(assessment.total_cost_of_children, dec!(11117.85));
    assert_eq!(assessment.payer_id, Some(a()));
    assert_eq!(assessment.payee_id, Some(b()));
    assert_eq!(assessment.annual_liability, dec!(8014.86));
    assert_eq!(assessment.periodic.monthly, dec!(667.91));
}

#[test]
fn test_golden_shared_care() {
    let assessment = calculator().assess(&snapshot(80000, 50000, 146, 219)).unwrap();

    assert_eq!(assessment.cost_percentage(&a()), Some(dec!(35)));
    assert_eq!(assessment.cost_percentage(&b()), Some(dec!(65)));
    assert_eq!(assessment.payment_between(&a(), &b()), dec!(4123.61));
    assert_eq!(assessment.payment_between(&b(), &a()), Decimal::ZERO);
}

#[test]
fn test_golden_multi_case_never_raises_income_percentage() {
    let calc = calculator();
    let baseline = snapshot(80000, 50000, 0, 365);
    let mut multi = baseline.clone();
    multi.case.parent_a.other_cases.push(OtherCase {
        case_id: CaseId::new("G-2"),
        other_party: Some(PartyId::new("Z")),
        children: vec![OtherCaseChild {
            date_of_birth: chrono::NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        }],
    });

    let base = calc.assess(&baseline).unwrap();
    let adjusted = calc.assess(&multi).unwrap();
    assert!(adjusted.income_percentage(&a()) < base.income_percentage(&a()));
    assert!(adjusted.annual_liability <= base.annual_liability);
}

#[test]
fn test_recompute_is_identical() {
    let calc = calculator();
    let input = snapshot(91234, 43210, 100, 265);
    let first = calc.assess(&input).unwrap();
    let second = calc.assess(&input).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_income_percentages_sum_to_one_hundred() {
    let calc = calculator();
    for (income_a, income_b) in [(80000, 50000), (45000, 45000), (150000, 32000), (60000, 0)] {
        let assessment = calc.assess(&snapshot(income_a, income_b, 0, 365)).unwrap();
        let total: Decimal = assessment.parents.iter().map(|p| p.income_percentage).sum();
        assert_eq!(total, dec!(100), "incomes {income_a}/{income_b}");
    }
}

#[test]
fn test_higher_payer_income_never_lowers_liability() {
    let calc = calculator();
    let mut previous = Decimal::ZERO;
    for income in (40000..=240000).step_by(20000) {
        let liability = calc.assess(&snapshot(income, 50000, 0, 365)).unwrap().annual_liability;
        assert!(liability >= previous, "liability fell at income {income}");
        previous = liability;
    }
}

#[test]
fn test_bundled_sample_cases_assess() {
    let calc = calculator();
    let batch = load_snapshots(concat!(env!("CARGO_MANIFEST_DIR"), "/data/cases/sample_cases.json")).unwrap();
    let cases: Vec<Case> = batch.iter().map(|s| s.case.clone()).collect();
    validate_portfolio(&cases).unwrap();
    let assessments: Vec<_> = batch.iter().map(|s| calc.assess(s).unwrap()).collect();

    assert_eq!(assessments[0].annual_liability, dec!(8014.86));
    let carer = PartyId::new("G-1003");
    assert_eq!(assessments[2].payment_between(&PartyId::new("P-1003-A"), &carer), dec!(8014.86));
    assert_eq!(assessments[2].payment_between(&PartyId::new("P-1003-B"), &carer), dec!(3102.99));
    assert_eq!(assessments[3].formula, Formula::MultiCase);
    assert_eq!(assessments[4].annual_liability, dec!(551));
}
