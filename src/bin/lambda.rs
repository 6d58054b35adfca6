//! AWS Lambda entry point: one assessment per invocation
//!
//! The event carries a case snapshot and any adjustments already decided
//! for it; the response is the full assessment.

use child_support_system::{Assessment, AssessmentCalculator, AssessmentOverrides, CaseSnapshot, RateRegistry};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct AssessRequest {
    snapshot: CaseSnapshot,
    #[serde(default)]
    overrides: AssessmentOverrides,
}

async fn handle(calculator: Arc<AssessmentCalculator>, event: LambdaEvent<AssessRequest>) -> Result<Assessment, Error> {
    let request = event.payload;
    log::info!(
        "Invocation {} assessing case {}",
        event.context.request_id,
        request.snapshot.case.id
    );
    let assessment = calculator.assess_with(&request.snapshot, &request.overrides)?;
    log::info!("{}", assessment.summary());
    Ok(assessment)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let registry = RateRegistry::load_default()?;
    log::info!("Rate schedules available: {:?}", registry.years());
    let calculator = Arc::new(AssessmentCalculator::new(Arc::new(registry)));

    run(service_fn(move |event| handle(Arc::clone(&calculator), event))).await
}
