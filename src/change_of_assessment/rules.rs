//! Evidentiary bars and evaluation for each reason code
//!
//! Evaluation is pure: it reads the application's evidence and the
//! assessment currently in force, and returns an outcome with the income or
//! cost adjustments that outcome makes.

use super::config::ReviewConfig;
use super::domain::{DecisionOutcome, Evidence, EvidenceKind, ExpenseCategory, ReasonCode};
use crate::assessment::{Assessment, AssessmentOverrides, IncomeOverride};
use crate::case::PartyId;
use crate::money::{apply_percentage, round_cents};
use rust_decimal::Decimal;

/// A kind of evidence a reason code cannot be decided without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceRequirement {
    IncomeReduction,
    NewRelationship,
    UndisclosedIncome,
    Expense(ExpenseCategory),
    ChildResources,
    DependantSupport,
    Statement,
}

impl EvidenceRequirement {
    pub fn label(self) -> String {
        match self {
            EvidenceRequirement::IncomeReduction => "income_reduction".to_string(),
            EvidenceRequirement::NewRelationship => "new_relationship".to_string(),
            EvidenceRequirement::UndisclosedIncome => "undisclosed_income".to_string(),
            EvidenceRequirement::Expense(category) => {
                format!("expense:{}", expense_label(category))
            }
            EvidenceRequirement::ChildResources => "child_resources".to_string(),
            EvidenceRequirement::DependantSupport => "dependant_support".to_string(),
            EvidenceRequirement::Statement => "statement".to_string(),
        }
    }

    pub fn satisfied_by(self, kind: &EvidenceKind) -> bool {
        match (self, kind) {
            (EvidenceRequirement::IncomeReduction, EvidenceKind::IncomeReduction { .. })
            | (EvidenceRequirement::NewRelationship, EvidenceKind::NewRelationship { .. })
            | (EvidenceRequirement::UndisclosedIncome, EvidenceKind::UndisclosedIncome { .. })
            | (EvidenceRequirement::ChildResources, EvidenceKind::ChildResources { .. })
            | (EvidenceRequirement::DependantSupport, EvidenceKind::DependantSupport { .. })
            | (EvidenceRequirement::Statement, EvidenceKind::Statement { .. }) => true,
            (EvidenceRequirement::Expense(wanted), EvidenceKind::Expense { category, .. }) => {
                wanted == *category
            }
            _ => false,
        }
    }
}

fn expense_label(category: ExpenseCategory) -> &'static str {
    match category {
        ExpenseCategory::Contact => "contact",
        ExpenseCategory::SpecialNeeds => "special_needs",
        ExpenseCategory::Education => "education",
        ExpenseCategory::Childcare => "childcare",
        ExpenseCategory::PropertySettlement => "property_settlement",
        ExpenseCategory::Commitments => "commitments",
        ExpenseCategory::Other => "other",
    }
}

/// Evidence a reason code needs before it can be decided
pub fn requirements(reason: ReasonCode) -> &'static [EvidenceRequirement] {
    use EvidenceRequirement as R;
    match reason {
        ReasonCode::HighCostsOfContact => &[R::Expense(ExpenseCategory::Contact)],
        ReasonCode::SpecialNeeds => &[R::Expense(ExpenseCategory::SpecialNeeds)],
        ReasonCode::EducationCosts => &[R::Expense(ExpenseCategory::Education)],
        ReasonCode::ChildsIncomeOrResources => &[R::ChildResources],
        ReasonCode::PropertySettlement => &[R::Expense(ExpenseCategory::PropertySettlement)],
        ReasonCode::HighCostsOfCareToEnableWorkOrStudy => &[R::Expense(ExpenseCategory::Childcare)],
        ReasonCode::CommitmentsReducingCapacity => &[R::Expense(ExpenseCategory::Commitments)],
        ReasonCode::IncomeOrFinancialResourcesNotReflected => &[R::UndisclosedIncome],
        ReasonCode::EarningCapacity => &[R::IncomeReduction, R::NewRelationship],
        ReasonCode::DutyToMaintainAnother => &[R::DependantSupport],
        ReasonCode::SpecialCircumstances => &[R::Statement, R::Expense(ExpenseCategory::Other)],
    }
}

/// Labels of the requirements no evidence on file satisfies
pub fn missing_evidence(reason: ReasonCode, evidence: &[Evidence]) -> Vec<String> {
    requirements(reason)
        .iter()
        .filter(|req| !evidence.iter().any(|e| req.satisfied_by(&e.kind)))
        .map(|req| req.label())
        .collect()
}

/// Outcome of evaluating an application
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: DecisionOutcome,
    pub findings: Vec<String>,
    pub overrides: AssessmentOverrides,
}

impl Evaluation {
    fn rejected(reason: impl Into<String>, findings: Vec<String>) -> Self {
        Self {
            outcome: DecisionOutcome::Rejected { reason: reason.into() },
            findings,
            overrides: AssessmentOverrides::default(),
        }
    }
}

/// Inputs the rules read besides the evidence
pub struct EvaluationContext<'a> {
    pub reason: ReasonCode,
    pub applicant: &'a PartyId,
    pub evidence: &'a [Evidence],
    /// Assessment in force when the decision is made
    pub current: &'a Assessment,
    pub config: &'a ReviewConfig,
}

/// How a substantiated amount changes the assessment
#[derive(Debug, Clone, Copy)]
enum Adjustment {
    /// Lowers the applicant's adjusted taxable income
    ReduceApplicantIncome,
    /// Raises the cost of the children
    IncreaseCost,
    /// Lowers the cost of the children
    ReduceCost,
}

pub fn evaluate(ctx: &EvaluationContext<'_>) -> Evaluation {
    let missing = missing_evidence(ctx.reason, ctx.evidence);
    if !missing.is_empty() {
        let reason = format!("evidence not provided: {}", missing.join(", "));
        let mut findings = vec![reason.clone()];
        if ctx.reason == ReasonCode::EarningCapacity {
            findings.push("a new partner's income is not taken into account".to_string());
        }
        return Evaluation::rejected(reason, findings);
    }

    match ctx.reason {
        ReasonCode::EarningCapacity => earning_capacity(ctx),
        ReasonCode::IncomeOrFinancialResourcesNotReflected => income_not_reflected(ctx),
        ReasonCode::HighCostsOfContact => {
            expense_claim(ctx, ExpenseCategory::Contact, Adjustment::ReduceApplicantIncome)
        }
        ReasonCode::PropertySettlement => {
            expense_claim(ctx, ExpenseCategory::PropertySettlement, Adjustment::ReduceApplicantIncome)
        }
        ReasonCode::CommitmentsReducingCapacity => {
            expense_claim(ctx, ExpenseCategory::Commitments, Adjustment::ReduceApplicantIncome)
        }
        ReasonCode::SpecialCircumstances => {
            expense_claim(ctx, ExpenseCategory::Other, Adjustment::ReduceApplicantIncome)
        }
        ReasonCode::SpecialNeeds => {
            expense_claim(ctx, ExpenseCategory::SpecialNeeds, Adjustment::IncreaseCost)
        }
        ReasonCode::EducationCosts => {
            expense_claim(ctx, ExpenseCategory::Education, Adjustment::IncreaseCost)
        }
        ReasonCode::HighCostsOfCareToEnableWorkOrStudy => {
            expense_claim(ctx, ExpenseCategory::Childcare, Adjustment::IncreaseCost)
        }
        ReasonCode::ChildsIncomeOrResources => {
            let amounts = ctx
                .evidence
                .iter()
                .filter_map(|e| match &e.kind {
                    EvidenceKind::ChildResources { annual_amount, substantiated } => {
                        Some((*annual_amount, *substantiated))
                    }
                    _ => None,
                })
                .collect();
            amount_claim(ctx, amounts, Adjustment::ReduceCost, "child's resources")
        }
        ReasonCode::DutyToMaintainAnother => {
            let amounts = ctx
                .evidence
                .iter()
                .filter_map(|e| match &e.kind {
                    EvidenceKind::DependantSupport { annual_amount, substantiated } => {
                        Some((*annual_amount, *substantiated))
                    }
                    _ => None,
                })
                .collect();
            amount_claim(ctx, amounts, Adjustment::ReduceApplicantIncome, "support of another person")
        }
    }
}

// ============================================================================
// Reason 8B: earning capacity
// ============================================================================

/// A deliberate income reduction correlated in time with a new relationship
/// of the same parent. Partner income is never read.
fn earning_capacity(ctx: &EvaluationContext<'_>) -> Evaluation {
    let window = i64::from(ctx.config.correlation_window_days);
    let mut findings = Vec::new();
    let mut overrides = AssessmentOverrides::default();

    for evidence in ctx.evidence {
        let EvidenceKind::IncomeReduction {
            party,
            previous_income,
            current_income,
            changed_on,
            cause,
        } = &evidence.kind
        else {
            continue;
        };

        let reduction = round_cents(*previous_income - *current_income);
        if reduction <= Decimal::ZERO {
            findings.push(format!("income of {party} did not fall"));
            continue;
        }
        if !cause.is_voluntary() {
            findings.push(format!("income of {party} fell for reasons outside their control"));
            continue;
        }
        let correlated = ctx.evidence.iter().any(|other| match &other.kind {
            EvidenceKind::NewRelationship { party: partnered, started_on, .. } => {
                partnered == party && (*changed_on - *started_on).num_days().abs() <= window
            }
            _ => false,
        });
        if !correlated {
            findings.push(format!(
                "income reduction of {party} on {changed_on} is not correlated with a new relationship"
            ));
            continue;
        }

        findings.push(format!(
            "{party} deliberately reduced income by {reduction}; earning capacity restored"
        ));
        overrides
            .income
            .entry(party.clone())
            .or_insert_with(IncomeOverride::default)
            .additional_income += reduction;
    }

    if overrides.is_empty() {
        findings.push("a new partner's income is not taken into account".to_string());
        return Evaluation::rejected(
            "no deliberate income reduction correlated with a new relationship",
            findings,
        );
    }
    Evaluation {
        outcome: DecisionOutcome::Accepted,
        findings,
        overrides,
    }
}

// ============================================================================
// Reason 8A: income not reflected
// ============================================================================

fn income_not_reflected(ctx: &EvaluationContext<'_>) -> Evaluation {
    let mut findings = Vec::new();
    let mut overrides = AssessmentOverrides::default();
    let mut unsubstantiated = 0usize;

    for evidence in ctx.evidence {
        let EvidenceKind::UndisclosedIncome { party, annual_amount, substantiated } = &evidence.kind
        else {
            continue;
        };
        if ctx.current.parent(party).is_none() {
            findings.push(format!("{party} is not a parent in case {}", ctx.current.case_id));
            unsubstantiated += 1;
            continue;
        }
        if !substantiated || *annual_amount <= Decimal::ZERO {
            findings.push(format!("income of {annual_amount} for {party} not substantiated"));
            unsubstantiated += 1;
            continue;
        }
        findings.push(format!("{annual_amount} of income for {party} added"));
        overrides
            .income
            .entry(party.clone())
            .or_insert_with(IncomeOverride::default)
            .additional_income += round_cents(*annual_amount);
    }

    if overrides.is_empty() {
        return Evaluation::rejected("no substantiated income outside the assessment", findings);
    }
    let outcome = if unsubstantiated > 0 {
        DecisionOutcome::PartiallyAccepted
    } else {
        DecisionOutcome::Accepted
    };
    Evaluation { outcome, findings, overrides }
}

// ============================================================================
// Amount-based reasons
// ============================================================================

fn expense_claim(ctx: &EvaluationContext<'_>, category: ExpenseCategory, adjustment: Adjustment) -> Evaluation {
    let amounts = ctx
        .evidence
        .iter()
        .filter_map(|e| match &e.kind {
            EvidenceKind::Expense { category: c, annual_amount, substantiated } if *c == category => {
                Some((*annual_amount, *substantiated))
            }
            _ => None,
        })
        .collect();
    amount_claim(ctx, amounts, adjustment, expense_label(category))
}

/// Substantiated amounts count; a total below the significance threshold
/// is rejected.
fn amount_claim(
    ctx: &EvaluationContext<'_>,
    amounts: Vec<(Decimal, bool)>,
    adjustment: Adjustment,
    what: &str,
) -> Evaluation {
    let accepted: Decimal = amounts
        .iter()
        .filter(|(amount, substantiated)| *substantiated && *amount > Decimal::ZERO)
        .map(|(amount, _)| *amount)
        .sum();
    let accepted = round_cents(accepted);
    let partial = amounts.iter().any(|(_, substantiated)| !substantiated);

    let threshold = apply_percentage(
        ctx.current.total_cost_of_children,
        ctx.config.significant_cost_percentage,
    );
    let mut findings = vec![format!("substantiated {what}: {accepted}")];

    if accepted.is_zero() {
        return Evaluation::rejected(format!("no substantiated {what}"), findings);
    }
    if accepted < threshold {
        findings.push(format!("significance threshold: {threshold}"));
        return Evaluation::rejected(
            format!("{what} of {accepted} is below the significance threshold of {threshold}"),
            findings,
        );
    }

    let mut overrides = AssessmentOverrides::default();
    match adjustment {
        Adjustment::ReduceApplicantIncome => {
            overrides
                .income
                .entry(ctx.applicant.clone())
                .or_insert_with(IncomeOverride::default)
                .income_reduction += accepted;
            findings.push(format!("income of {} reduced by {accepted}", ctx.applicant));
        }
        Adjustment::IncreaseCost => {
            overrides.cost_of_children_adjustment += accepted;
            findings.push(format!("cost of the children increased by {accepted}"));
        }
        Adjustment::ReduceCost => {
            overrides.cost_of_children_adjustment -= accepted;
            findings.push(format!("cost of the children reduced by {accepted}"));
        }
    }

    let outcome = if partial {
        DecisionOutcome::PartiallyAccepted
    } else {
        DecisionOutcome::Accepted
    };
    Evaluation { outcome, findings, overrides }
}
