use crate::infra::{build_orchestrator, demo_fixture, DemoOrchestrator, InMemoryWorkSource};
use admission_review::config::AppConfig;
use admission_review::error::AppError;
use admission_review::workflows::review::{OrchestratorError, RunSummary, RunTrigger, SubjectResult};
use clap::Args;

#[derive(Args, Debug, Default)]
pub(crate) struct RunOnceArgs {
    /// Override the configured number of documents verified in parallel
    #[arg(long)]
    pub(crate) concurrency: Option<usize>,
    /// Re-verify documents already marked as verified
    #[arg(long)]
    pub(crate) recheck_verified: bool,
    /// Print the run summary and subject results as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_once(args: RunOnceArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    let settings = &mut config.review.settings;
    if let Some(concurrency) = args.concurrency {
        settings.concurrency = concurrency;
    }
    if args.recheck_verified {
        settings.skip_already_verified = false;
    }
    // Local collaborators need no pacing.
    settings.item_delay_ms = 0;
    settings.subject_delay_ms = 0;
    settings.validate().map_err(OrchestratorError::from)?;

    let (source, store) = demo_fixture();
    let orchestrator = build_orchestrator(&config.review, source.clone(), store);
    let summary = orchestrator
        .run_batch(RunTrigger::Manual)
        .await
        .ok_or(OrchestratorError::Busy)?;
    let results = subject_results(&orchestrator);

    if args.json {
        let payload = serde_json::json!({ "run": summary, "subjects": results });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).map_err(std::io::Error::from)?
        );
    } else {
        render_summary(&summary, &results, &source);
    }
    Ok(())
}

fn subject_results(orchestrator: &DemoOrchestrator) -> Vec<SubjectResult> {
    orchestrator
        .cached_results()
        .into_iter()
        .filter_map(|summary| orchestrator.cached_result(&summary.subject_id).ok())
        .collect()
}

fn render_summary(summary: &RunSummary, results: &[SubjectResult], source: &InMemoryWorkSource) {
    println!("=== Admission Review Run ===");
    println!("Run: {} ({})", summary.id, summary.trigger.label());
    println!("Status: {}", summary.status.label());
    let totals = &summary.totals;
    println!(
        "Subjects: {} processed of {} ({} completed, {} partial, {} skipped, {} errors)",
        totals.processed,
        totals.subjects,
        totals.completed,
        totals.partial,
        totals.skipped,
        totals.errors
    );
    println!(
        "Documents: {} approved, {} rejected, {} errors, {} skipped",
        totals.documents_approved,
        totals.documents_rejected,
        totals.documents_errors,
        totals.documents_skipped
    );
    if let Some(error) = &summary.error {
        println!("Error: {error}");
    }

    for result in results {
        let verified = source
            .items(&result.subject_id)
            .iter()
            .filter(|item| item.verified)
            .count();
        println!(
            "\n-- {} [{}] {} verified on record",
            result.subject_name, result.status, verified
        );
        for annotated in &result.items {
            match &annotated.outcome {
                Some(outcome) => println!(
                    "   {:<24} {:<9} {:.2}  {}",
                    annotated.item.label,
                    outcome.status.label(),
                    outcome.confidence,
                    outcome.remark
                ),
                None => println!("   {:<24} pending", annotated.item.label),
            }
            if let Some(outcome) = &annotated.outcome {
                for issue in &outcome.issues {
                    println!("   {:<24}   - {issue}", "");
                }
            }
        }
    }
}
