use std::sync::Arc;

use stockpulse_core::{MarketOverviewCollector, RequestPacer, ReqwestHttpClient, SharedBackend};

use crate::cli::MarketArgs;
use crate::error::CliError;

use super::{CommandContext, CommandResult};

pub async fn run(args: &MarketArgs, context: &CommandContext) -> Result<CommandResult, CliError> {
    let config = &context.config;
    let policy = config.provider_policy();
    let backend = SharedBackend::yahoo(Arc::new(ReqwestHttpClient::new()), policy.request_timeout_ms());
    let collector = MarketOverviewCollector::new(backend, RequestPacer::from_policy(&policy.pacing))
        .with_utc_offset(config.utc_offset_hours);

    let universe = args.breadth.then_some(config.breadth_universe.as_slice());
    let overview = collector.overview(universe).await;

    let result = CommandResult::ok(serde_json::to_value(&overview)?).with_source("yahoo");
    if args.breadth && config.breadth_universe.is_empty() {
        return Ok(result.with_warning("BREADTH_UNIVERSE is empty; breadth covers no symbols"));
    }
    Ok(result)
}
