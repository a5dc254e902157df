use serde_json::json;
use stockpulse_core::{market_today, parse_date, DailyQuery, FetchRange, Symbol};

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{CommandContext, CommandResult};

pub async fn run(args: &FetchArgs, context: &CommandContext) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let query = build_query(args, context)?;
    let range = query.resolve();

    let registry = context.registry();
    let outcome = registry.get_daily_data(&symbol, &query).await?;

    let warnings: Vec<String> = outcome
        .failures
        .iter()
        .map(|failure| format!("{} skipped: {}", failure.provider, failure.error))
        .collect();

    let data = json!({
        "symbol": outcome.symbol,
        "start": range.start().to_string(),
        "end": range.end().to_string(),
        "rows": outcome.series.len(),
        "series": outcome.series,
        "latency_ms": outcome.latency_ms,
    });

    let mut result = CommandResult::ok(data).with_source(outcome.source_name);
    for warning in warnings {
        result = result.with_warning(warning);
    }
    Ok(result)
}

fn build_query(args: &FetchArgs, context: &CommandContext) -> Result<DailyQuery, CliError> {
    let today = market_today(context.config.utc_offset_hours);
    let end = args.end.as_deref().map(parse_date).transpose()?.unwrap_or(today);
    let query = DailyQuery::new()
        .with_lookback_days(args.days.unwrap_or(context.config.lookback_days))
        .as_of(end);

    match args.start.as_deref() {
        Some(start) => Ok(query.with_range(FetchRange::new(parse_date(start)?, end)?)),
        None => Ok(query),
    }
}
