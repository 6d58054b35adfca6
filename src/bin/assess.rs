//! Assess one case snapshot and write the assessment as JSON

use anyhow::{anyhow, Context, Result};
use child_support_system::case::load_snapshot;
use child_support_system::{AssessmentCalculator, RateRegistry};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "assess", about = "Run the child support formula for a single case")]
struct Args {
    /// Case snapshot JSON file
    snapshot: PathBuf,

    /// Rate schedule directory (defaults to CHILD_SUPPORT_RATES_DIR or data/rates)
    #[arg(long)]
    rates_dir: Option<PathBuf>,

    /// Financial year to assess under, overriding the snapshot
    #[arg(long)]
    year: Option<u16>,

    /// Write the assessment here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let registry = match &args.rates_dir {
        Some(dir) => RateRegistry::load_from_dir(dir)
            .with_context(|| format!("loading rate schedules from {}", dir.display()))?,
        None => RateRegistry::load_default().context("loading default rate schedules")?,
    };
    log::info!("Rate schedules available: {:?}", registry.years());

    let mut snapshot = load_snapshot(&args.snapshot)
        .map_err(|e| anyhow!("loading {}: {e}", args.snapshot.display()))?;
    if let Some(year) = args.year {
        snapshot.financial_year = Some(year);
    }

    let calculator = AssessmentCalculator::new(Arc::new(registry));
    let assessment = calculator
        .assess(&snapshot)
        .with_context(|| format!("assessing case {}", snapshot.case.id))?;

    eprintln!("{}", assessment.summary());
    let json = serde_json::to_string_pretty(&assessment)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Assessment written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
