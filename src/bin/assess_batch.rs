//! Assess a batch of case snapshots in parallel
//!
//! Outputs one CSV row per case with the payer, payee and amounts, or the
//! reason the case could not be assessed

use anyhow::{anyhow, Context, Result};
use child_support_system::assessment::validate_portfolio;
use child_support_system::case::{load_snapshots, Case};
use child_support_system::{Assessment, AssessmentCalculator, AssessmentError, CaseSnapshot, RateRegistry};
use clap::Parser;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "assess_batch", about = "Assess every case in a JSON array of snapshots")]
struct Args {
    /// JSON file holding an array of case snapshots
    input: PathBuf,

    /// Rate schedule directory (defaults to CHILD_SUPPORT_RATES_DIR or data/rates)
    #[arg(long)]
    rates_dir: Option<PathBuf>,

    /// Financial year to assess every case under
    #[arg(long)]
    year: Option<u16>,

    /// Summary CSV path
    #[arg(long, default_value = "assessment_summary.csv")]
    output: PathBuf,
}

/// One line of the summary file
#[derive(Debug, Serialize)]
struct SummaryRow {
    case_id: String,
    formula: String,
    payer: String,
    payee: String,
    combined_income: Option<Decimal>,
    cost_of_children: Option<Decimal>,
    annual_liability: Option<Decimal>,
    monthly: Option<Decimal>,
    error: String,
}

impl SummaryRow {
    fn new(snapshot: &CaseSnapshot, result: &Result<Assessment, AssessmentError>) -> Self {
        match result {
            Ok(a) => Self {
                case_id: a.case_id.to_string(),
                formula: a.formula.to_string(),
                payer: a.payer_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                payee: a.payee_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                combined_income: Some(a.combined_child_support_income),
                cost_of_children: Some(a.total_cost_of_children),
                annual_liability: Some(a.annual_liability),
                monthly: Some(a.periodic.monthly),
                error: String::new(),
            },
            Err(e) => Self {
                case_id: snapshot.case.id.to_string(),
                formula: String::new(),
                payer: String::new(),
                payee: String::new(),
                combined_income: None,
                cost_of_children: None,
                annual_liability: None,
                monthly: None,
                error: e.to_string(),
            },
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let registry = match &args.rates_dir {
        Some(dir) => RateRegistry::load_from_dir(dir)
            .with_context(|| format!("loading rate schedules from {}", dir.display()))?,
        None => RateRegistry::load_default().context("loading default rate schedules")?,
    };
    let calculator = AssessmentCalculator::new(Arc::new(registry));

    let mut snapshots = load_snapshots(&args.input)
        .map_err(|e| anyhow!("loading {}: {e}", args.input.display()))?;
    if let Some(year) = args.year {
        for snapshot in &mut snapshots {
            snapshot.financial_year = Some(year);
        }
    }
    println!("Loaded {} cases in {:?}", snapshots.len(), start.elapsed());

    let cases: Vec<Case> = snapshots.iter().map(|s| s.case.clone()).collect();
    validate_portfolio(&cases).with_context(|| format!("checking case links in {}", args.input.display()))?;

    let assess_start = Instant::now();
    let results: Vec<Result<Assessment, AssessmentError>> = snapshots
        .par_iter()
        .map(|snapshot| calculator.assess(snapshot))
        .collect();
    println!("Assessments complete in {:?}", assess_start.elapsed());

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut failed = 0usize;
    let mut total = Decimal::ZERO;
    for (snapshot, result) in snapshots.iter().zip(&results) {
        match result {
            Ok(assessment) => total += assessment.annual_liability,
            Err(e) => {
                failed += 1;
                log::warn!("Case {} not assessed: {e}", snapshot.case.id);
            }
        }
        writer.serialize(SummaryRow::new(snapshot, result))?;
    }
    writer.flush()?;

    println!("Output written to {}", args.output.display());
    println!("\nBatch Summary:");
    println!("  Assessed: {}", results.len() - failed);
    println!("  Failed:   {failed}");
    println!("  Total annual liability: ${total}");
    println!("\nTotal time: {:?}", start.elapsed());
    Ok(())
}
