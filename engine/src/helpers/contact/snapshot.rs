//! Field snapshots

use async_trait::async_trait;
use chrono::Utc;
use sdk::{
    ActionType, ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig,
    HelperError, HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Map, Value};

use crate::helpers::{best_effort, invalid_config, read_field, store_field, PrimaryStep};

struct SnapshotSettings<'a> {
    fields: Vec<String>,
    target: &'a str,
}

impl<'a> SnapshotSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let fields = config.str_list("fields")?;
        if fields.is_empty() {
            return Err(HelperError::config("fields must list at least one field"));
        }
        Ok(Self {
            fields,
            target: config.require_str("target_field")?,
        })
    }
}

/// Capture the current values of several fields as a JSON document
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotIt;

#[async_trait]
impl Helper for SnapshotIt {
    fn name(&self) -> &str {
        "Snapshot It"
    }

    fn helper_type(&self) -> &str {
        "snapshot_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Store the current values of several fields as a JSON snapshot"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required(
                "fields",
                PropertySchema::array("Fields to capture", PropertySchema::string("Field key")),
            )
            .required("target_field", PropertySchema::string("Field to store the snapshot in"))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        SnapshotSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = SnapshotSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let mut captured = Map::new();
        for field in &s.fields {
            let read = read_field(ctx, input, field).await;
            let what = format!("Reading field '{}'", field);
            if let Some(value) = best_effort(&mut output, &what, read)? {
                captured.insert(field.clone(), value.unwrap_or(Value::Null));
            }
        }

        // Stored as JSON text; the output records exactly what was written
        let snapshot = Value::String(
            json!({
                "captured_at": Utc::now().to_rfc3339(),
                "fields": captured,
            })
            .to_string(),
        );
        store_field(ctx, input, s.target, snapshot.clone())
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        output
            .modified_data
            .insert(s.target.to_string(), snapshot.clone());
        output.action(ActionType::SnapshotCaptured, s.target, snapshot);

        let count = s.fields.len() - output.logs.len();
        Ok(output.succeed(format!("Captured {} field(s) into '{}'", count, s.target)))
    }
}
