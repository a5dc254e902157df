use serde_json::json;
use stockpulse_core::Symbol;

use crate::cli::SymbolArgs;
use crate::error::CliError;

use super::{CommandContext, CommandResult};

pub async fn run(args: &SymbolArgs, context: &CommandContext) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let name = context.registry().get_symbol_name(&symbol).await;

    let result = CommandResult::ok(json!({ "symbol": symbol, "name": name }));
    if name.is_none() {
        return Ok(result.with_warning(format!("no provider knows a name for {symbol}")));
    }
    Ok(result)
}
