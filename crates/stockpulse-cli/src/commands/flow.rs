use serde_json::json;
use stockpulse_core::{parse_date, Market, Symbol};

use crate::cli::FlowArgs;
use crate::error::CliError;

use super::{CommandContext, CommandResult};

pub async fn run(args: &FlowArgs, context: &CommandContext) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let date = args.date.as_deref().map(parse_date).transpose()?;

    let flow = context.registry().get_auxiliary_data(&symbol, date).await;

    let result = CommandResult::ok(json!({ "symbol": symbol, "flow": flow }));
    match (&flow, symbol.market()) {
        (Some(_), _) => Ok(result.with_source("institutional")),
        (None, Market::Domestic) => Ok(result.with_warning(format!(
            "no institutional flow found for {symbol}"
        ))),
        (None, _) => Ok(result.with_warning("institutional flow covers domestic listings only")),
    }
}
