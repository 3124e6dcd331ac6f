//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - list: Show the helper catalog
//! - schema: Print one helper's configuration schema
//! - validate: Check a helper configuration
//! - run: Execute a helper for contacts against the configured connector

use anyhow::{anyhow, bail, Context, Result};
use sdk::{CrmConnector, HelperCategory, HelperConfig, HelperErrorExt};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, ConnectorKind};
use crate::connectors::{MemoryConnector, RestConnector};
use crate::executor::{ExecutionRecord, ExecutionRequest, HelperExecutor};
use crate::registry::HelperRegistry;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Parse `--params`: inline JSON, or `@path` to a JSON file
pub fn parse_params(params: &str) -> Result<HelperConfig> {
    let text = match params.trim().strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read params file '{}'", path))?,
        None => params.to_string(),
    };
    let value: Value = serde_json::from_str(&text).context("Params are not valid JSON")?;
    Ok(HelperConfig::from_value(value)?)
}

/// Build the connector selected by the configuration
///
/// `fixture` overrides the configured memory fixture.
pub fn build_connector(config: &Config, fixture: Option<&Path>) -> Result<Arc<dyn CrmConnector>> {
    let settings = &config.connector;
    match settings.kind {
        ConnectorKind::Memory => {
            let connector = match fixture.or(settings.fixture.as_deref()) {
                Some(path) => MemoryConnector::load_fixture(path)
                    .with_context(|| format!("Failed to load fixture {:?}", path))?,
                None => MemoryConnector::new().with_slug(settings.platform.clone()),
            };
            Ok(Arc::new(connector))
        }
        ConnectorKind::Rest => {
            if fixture.is_some() {
                bail!("--fixture only applies to the memory connector");
            }
            let base_url = settings
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow!("connector.base_url is not set"))?;
            let mut connector = RestConnector::new(settings.platform.clone(), base_url)?;
            match settings.api_key() {
                Some(key) => connector = connector.with_api_key(key),
                None => tracing::warn!(
                    "{} is not set, calling {} without credentials",
                    settings.api_key_env,
                    base_url
                ),
            }
            Ok(Arc::new(connector))
        }
    }
}

/// List registered helpers
pub fn handle_list(
    registry: &HelperRegistry,
    category: Option<HelperCategory>,
    format: OutputFormat,
) -> Result<()> {
    let helpers: Vec<_> = registry
        .list_helper_info()
        .into_iter()
        .filter(|info| category.map_or(true, |c| info.category == c))
        .collect();

    match format {
        OutputFormat::Text => {
            if helpers.is_empty() {
                println!("No helpers registered");
                return Ok(());
            }

            let mut current = None;
            for info in &helpers {
                if current != Some(info.category) {
                    if current.is_some() {
                        println!();
                    }
                    println!("{}:", info.category);
                    current = Some(info.category);
                }
                println!("  {:<26} {}", info.helper_type, info.description);
            }
            println!();
            println!("{} helper(s)", helpers.len());
        }
        OutputFormat::Json => {
            let output = json!({
                "helpers": helpers,
                "count": helpers.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print a helper's configuration schema
pub fn handle_schema(registry: &HelperRegistry, helper_type: &str, format: OutputFormat) -> Result<()> {
    let info = registry
        .helper_info(helper_type)
        .ok_or_else(|| sdk::HelperError::UnknownHelperType(helper_type.to_string()))?;

    match format {
        OutputFormat::Text => {
            println!("{} ({})", info.name, info.helper_type);
            println!("  {}", info.description);
            if let Some(platforms) = &info.supported_crms {
                println!("  Platforms: {}", platforms.join(", "));
            }
            println!();
            println!("{}", serde_json::to_string_pretty(&info.config_schema)?);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&info.config_schema)?);
        }
    }

    Ok(())
}

/// Check a helper configuration without touching any connector
pub fn handle_validate(
    registry: &HelperRegistry,
    helper_type: &str,
    params: &str,
    format: OutputFormat,
) -> Result<()> {
    let config = parse_params(params)?;
    let result = registry
        .new_helper(helper_type)
        .and_then(|helper| helper.validate_config(&config));

    match format {
        OutputFormat::Text => match &result {
            Ok(()) => println!("Configuration for '{}' is valid", helper_type),
            Err(e) => {
                println!("Configuration for '{}' is invalid: {}", helper_type, e);
                println!("  Hint: {}", e.user_hint());
            }
        },
        OutputFormat::Json => {
            let output = match &result {
                Ok(()) => json!({ "helper_type": helper_type, "valid": true }),
                Err(e) => json!({
                    "helper_type": helper_type,
                    "valid": false,
                    "error": e.to_string(),
                    "hint": e.user_hint(),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    result.map_err(Into::into)
}

/// Options for `crmflow run`
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub helper_type: &'a str,
    pub contacts: &'a [String],
    pub params: &'a str,
    pub fixture: Option<&'a Path>,
    pub account: Option<&'a str>,
    pub concurrency: usize,
}

/// Execute a helper for every requested contact
pub async fn handle_run(
    registry: &HelperRegistry,
    options: RunOptions<'_>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let helper_config = parse_params(options.params)?;
    let connector = build_connector(config, options.fixture)?;
    let executor = HelperExecutor::new(registry, &config.execution);

    let requests = options
        .contacts
        .iter()
        .map(|contact| {
            let request =
                ExecutionRequest::new(options.helper_type, contact.clone(), helper_config.clone());
            match options.account {
                Some(account) => request.with_account(account),
                None => request,
            }
        })
        .collect();

    let results = executor
        .execute_all(requests, connector, options.concurrency)
        .await;

    let failed = results
        .iter()
        .filter(|result| !result.as_ref().is_ok_and(ExecutionRecord::succeeded))
        .count();

    match format {
        OutputFormat::Text => {
            for (contact, result) in options.contacts.iter().zip(&results) {
                print_result(contact, result);
            }
        }
        OutputFormat::Json => {
            let entries: Vec<Value> = options
                .contacts
                .iter()
                .zip(&results)
                .map(|(contact, result)| match result {
                    Ok(record) => json!(record),
                    Err(e) => json!({
                        "contact_id": contact,
                        "helper_type": options.helper_type,
                        "error": {
                            "message": e.to_string(),
                            "hint": e.user_hint(),
                            "recoverable": e.is_recoverable(),
                        },
                    }),
                })
                .collect();
            let output = json!({
                "executions": entries,
                "count": results.len(),
                "failed": failed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if failed > 0 {
        bail!("{} of {} execution(s) failed", failed, results.len());
    }
    Ok(())
}

fn print_result(contact: &str, result: &std::result::Result<ExecutionRecord, sdk::HelperError>) {
    match result {
        Ok(record) => {
            let status = if record.succeeded() { "ok" } else { "FAILED" };
            println!(
                "[{}] {} for contact {} ({}ms): {}",
                status, record.helper_type, record.contact_id, record.duration_ms, record.output.message
            );
            for action in &record.output.actions {
                println!("  {} {} = {}", action.action_type, action.target, action.value);
            }
            for line in &record.output.logs {
                println!("  log: {}", line);
            }
            if let Some(error) = &record.error {
                println!("  error: {}", error.message);
                println!("  hint: {}", error.hint);
            }
        }
        Err(e) => {
            println!("[REJECTED] contact {}: {}", contact, e);
            println!("  hint: {}", e.user_hint());
        }
    }
}
