use serde_json::json;
use stockpulse_core::{Store, Symbol};

use crate::cli::ContextArgs;
use crate::error::CliError;

use super::{CommandContext, CommandResult};

pub async fn run(args: &ContextArgs, context: &CommandContext) -> Result<CommandResult, CliError> {
    if args.limit == 0 {
        return Err(CliError::Usage(String::from("--limit must be at least 1")));
    }

    let symbol = Symbol::parse(&args.symbol)?;
    let warehouse = context.open_warehouse()?;
    let limit = args.limit;
    let key = symbol.as_str().to_owned();

    let analysis = tokio::task::spawn_blocking(move || warehouse.get_context(&key, limit))
        .await
        .map_err(|error| CliError::Io(std::io::Error::other(error)))??;

    let result = CommandResult::ok(json!({ "symbol": symbol, "context": analysis }));
    if analysis.is_none() {
        return Ok(result.with_warning(format!("no stored rows for {symbol}")));
    }
    Ok(result)
}
