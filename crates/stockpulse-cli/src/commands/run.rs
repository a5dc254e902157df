use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use stockpulse_core::config::split_list;
use stockpulse_core::{BatchOrchestrator, DataError, RunOptions, RunReport, Store};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;

use super::{CommandContext, CommandResult};

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    stored: usize,
    skipped: usize,
    failed: usize,
    #[serde(flatten)]
    report: &'a RunReport,
}

pub async fn run(args: &RunArgs, context: &CommandContext) -> Result<CommandResult, CliError> {
    let symbols = match &args.stocks {
        Some(stocks) => split_list(&stocks.join(",")),
        None => context.config.stock_list.clone(),
    };
    if symbols.is_empty() {
        return Err(CliError::Usage(String::from(
            "no symbols to run: pass --stocks or set STOCK_LIST",
        )));
    }

    let mut pipeline = context.config.pipeline_config();
    if let Some(workers) = args.workers {
        pipeline.max_workers = usize::from(workers);
    }

    let warehouse = context.open_warehouse()?;
    let store: Arc<dyn Store> = warehouse;
    let orchestrator = BatchOrchestrator::new(Arc::new(context.registry()), store, pipeline);
    let options = RunOptions {
        force_refresh: args.force_refresh,
        dry_run: args.dry_run,
    };

    info!(symbols = symbols.len(), force_refresh = options.force_refresh, dry_run = options.dry_run, "starting batch");

    match orchestrator.run(&symbols, options).await {
        Ok(report) => {
            let result = summarize(&report)?;
            if report.has_failures() {
                return Ok(result.with_failure(CliError::BatchFailures {
                    failed: report.failed(),
                    total: report.results.len(),
                }));
            }
            Ok(result)
        }
        Err(aborted) => {
            warn!(error = %aborted.error, completed = aborted.partial.results.len(), "batch aborted");
            let result = summarize(&aborted.partial)?
                .with_warning(format!("batch aborted after {} results", aborted.partial.results.len()));
            Ok(result.with_failure(CliError::Data(aborted.error)))
        }
    }
}

fn summarize(report: &RunReport) -> Result<CommandResult, CliError> {
    let summary = RunSummary {
        stored: report.stored(),
        skipped: report.skipped(),
        failed: report.failed(),
        report,
    };
    let errors = report
        .failures()
        .map(|(symbol, reason)| failure_entry(symbol, reason))
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(summary)?).with_errors(errors))
}

/// One line per failed symbol with every provider's cause, in priority order.
fn failure_entry(symbol: &str, reason: &DataError) -> Value {
    let providers: Vec<Value> = reason
        .provider_failures()
        .iter()
        .map(|failure| {
            json!({
                "provider": failure.provider,
                "kind": failure.error.kind(),
                "message": failure.error.to_string(),
            })
        })
        .collect();

    json!({
        "symbol": symbol,
        "kind": reason.kind(),
        "message": reason.to_string(),
        "providers": providers,
    })
}
