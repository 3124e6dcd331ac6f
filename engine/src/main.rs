// crmflow
// Main entry point for the crmflow binary

use clap::Parser;
use crmflow_engine::cli::{Cli, Command};
use crmflow_engine::config::Config;
use crmflow_engine::handlers::{
    handle_list, handle_run, handle_schema, handle_validate, OutputFormat, RunOptions,
};
use crmflow_engine::registry;
use crmflow_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load_or_create(),
    };

    // Priority: RUST_LOG > --log > config file
    match (&cli.log, &config) {
        (Some(level), _) => init_telemetry_with_level(level),
        (None, Ok(config)) => init_telemetry_with_level(&config.core.log_level),
        (None, Err(_)) => init_telemetry(),
    }
    let config = config?;

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("crmflow v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let registry = registry::global();

    match cli.command {
        Command::List { category } => handle_list(registry, category, format),

        Command::Schema { helper_type } => handle_schema(registry, &helper_type, format),

        Command::Validate {
            helper_type,
            params,
        } => handle_validate(registry, &helper_type, &params, format),

        Command::Run {
            helper_type,
            contacts,
            params,
            fixture,
            account,
            concurrency,
        } => {
            let options = RunOptions {
                helper_type: &helper_type,
                contacts: &contacts,
                params: &params,
                fixture: fixture.as_deref(),
                account: account.as_deref(),
                concurrency,
            };
            handle_run(registry, options, &config, format).await
        }
    }
}
