mod context;
mod fetch;
mod flow;
mod market;
mod name;
mod run;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use stockpulse_core::{AppConfig, ProviderRegistry, RegistryBuilder};
use stockpulse_warehouse::{Warehouse, WarehouseConfig};
use tracing::{debug, info_span, Instrument};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata, RequestId};

/// Payload of one command, before metadata is attached.
pub struct CommandResult {
    pub data: Value,
    pub source: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<Value>,
    /// Printed output still goes out; this only decides the exit code.
    pub failure: Option<CliError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            source: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            failure: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<Value>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_failure(mut self, failure: CliError) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// Shared state for one invocation.
pub struct CommandContext {
    pub config: AppConfig,
}

impl CommandContext {
    pub fn new(cli: &Cli) -> Result<Self, CliError> {
        let mut config = AppConfig::from_env()?;
        if let Some(db_path) = &cli.db_path {
            config.db_path = db_path.clone();
        }
        Ok(Self { config })
    }

    pub fn registry(&self) -> ProviderRegistry {
        RegistryBuilder::new()
            .with_policy(self.config.provider_policy())
            .with_utc_offset(self.config.utc_offset_hours)
            .build()
    }

    pub fn open_warehouse(&self) -> Result<Arc<Warehouse>, CliError> {
        let warehouse = Warehouse::open(WarehouseConfig::from_app_config(&self.config))?;
        Ok(Arc::new(warehouse))
    }
}

const fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Run(_) => "run",
        Command::Fetch(_) => "fetch",
        Command::Name(_) => "name",
        Command::Flow(_) => "flow",
        Command::Context(_) => "context",
        Command::Market(_) => "market",
    }
}

/// Runs the selected command and wraps its payload. The second value, when present,
/// decides a non-zero exit after the envelope is printed.
pub async fn run(cli: &Cli) -> Result<(Envelope, Option<CliError>), CliError> {
    let request_id = RequestId::new_v4();
    let name = command_name(&cli.command);
    let span = info_span!("command", command = name, request_id = %request_id);

    execute(cli, Metadata::new(request_id, name)).instrument(span).await
}

async fn execute(cli: &Cli, mut meta: Metadata) -> Result<(Envelope, Option<CliError>), CliError> {
    let started = Instant::now();
    let context = CommandContext::new(cli)?;
    debug!(db_path = %context.config.db_path.display(), "configuration loaded");

    let result = match &cli.command {
        Command::Run(args) => run::run(args, &context).await?,
        Command::Fetch(args) => fetch::run(args, &context).await?,
        Command::Name(args) => name::run(args, &context).await?,
        Command::Flow(args) => flow::run(args, &context).await?,
        Command::Context(args) => context::run(args, &context).await?,
        Command::Market(args) => market::run(args, &context).await?,
    };

    let CommandResult {
        data,
        source,
        warnings,
        errors,
        failure,
    } = result;

    meta.elapsed_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
    meta.source = source;
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok((Envelope { meta, data, errors }, failure))
}
