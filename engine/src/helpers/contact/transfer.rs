//! Field transfer helpers: copy, move, merge, combine, map, clear, default

use async_trait::async_trait;
use futures::future::join_all;
use sdk::types::{is_empty_value, value_to_string};
use sdk::{
    ConfigSchema, ExecContext, ExecutionFailure, FieldMap, Helper, HelperCategory, HelperConfig,
    HelperError, HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};

use crate::helpers::template;
use crate::helpers::{
    best_effort, invalid_config, load_contact, may_write, read_field, write_field, PrimaryStep,
};

fn overwrite_property(default: bool) -> PropertySchema {
    PropertySchema::boolean("Replace the target field when it already has a value")
        .with_default(json!(default))
}

/// Drop absent and blank values
fn non_empty(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !is_empty_value(Some(v)))
}

/// Join field values
///
/// With `skip_empty` empty values are dropped, otherwise they keep their
/// position as empty strings. `None` when there is nothing to join.
fn join_values(values: &[Option<Value>], separator: &str, skip_empty: bool) -> Option<String> {
    let parts: Vec<String> = values
        .iter()
        .filter_map(|value| match value {
            Some(v) if !is_empty_value(Some(v)) => Some(value_to_string(v).trim().to_string()),
            _ if skip_empty => None,
            _ => Some(String::new()),
        })
        .collect();

    if parts.iter().all(String::is_empty) {
        None
    } else {
        Some(parts.join(separator))
    }
}

// ---------------------------------------------------------------------------
// copy_it
// ---------------------------------------------------------------------------

struct CopySettings<'a> {
    source: &'a str,
    target: &'a str,
    overwrite: bool,
}

impl<'a> CopySettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            source: config.require_str("source_field")?,
            target: config.require_str("target_field")?,
            overwrite: config.bool_or("overwrite", true)?,
        })
    }
}

/// Copy one field's value to another field
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyIt;

#[async_trait]
impl Helper for CopyIt {
    fn name(&self) -> &str {
        "Copy It"
    }

    fn helper_type(&self) -> &str {
        "copy_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Copy the value of one contact field into another field"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("source_field", PropertySchema::string("Field to copy from"))
            .required("target_field", PropertySchema::string("Field to copy to"))
            .optional("overwrite", overwrite_property(true))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        CopySettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = CopySettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let value = read_field(ctx, input, s.source)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.source))?;
        let Some(value) = non_empty(value) else {
            return Ok(output.succeed(format!("Field '{}' is empty, nothing to copy", s.source)));
        };

        let writable = may_write(ctx, input, s.target, s.overwrite)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.target))?;
        if !writable {
            return Ok(output.succeed(format!(
                "Field '{}' already has a value, left unchanged",
                s.target
            )));
        }

        write_field(ctx, input, &mut output, s.target, value)
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!("Copied '{}' to '{}'", s.source, s.target)))
    }
}

// ---------------------------------------------------------------------------
// move_it
// ---------------------------------------------------------------------------

struct MoveSettings<'a> {
    source: &'a str,
    target: &'a str,
    preserve: bool,
}

impl<'a> MoveSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let settings = Self {
            source: config.require_str("source_field")?,
            target: config.require_str("target_field")?,
            preserve: config.bool_or("preserve", false)?,
        };
        if settings.source == settings.target {
            return Err(HelperError::config(
                "source_field and target_field must be different",
            ));
        }
        Ok(settings)
    }
}

/// Move a value to another field and clear the source
#[derive(Debug, Default, Clone, Copy)]
pub struct MoveIt;

#[async_trait]
impl Helper for MoveIt {
    fn name(&self) -> &str {
        "Move It"
    }

    fn helper_type(&self) -> &str {
        "move_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Move the value of one contact field into another field and clear the source"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("source_field", PropertySchema::string("Field to move from"))
            .required("target_field", PropertySchema::string("Field to move to"))
            .optional(
                "preserve",
                PropertySchema::boolean("Leave both fields untouched when the target has a value")
                    .with_default(json!(false)),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        MoveSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = MoveSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        // Primary: read source, write target
        let value = read_field(ctx, input, s.source)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.source))?;
        let Some(value) = non_empty(value) else {
            return Ok(output.succeed(format!("Field '{}' is empty, nothing to move", s.source)));
        };

        let writable = may_write(ctx, input, s.target, !s.preserve)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.target))?;
        if !writable {
            return Ok(output.succeed(format!(
                "Field '{}' already has a value, both fields left unchanged",
                s.target
            )));
        }

        write_field(ctx, input, &mut output, s.target, value)
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;

        // Secondary: clear the source
        let cleared = write_field(ctx, input, &mut output, s.source, json!("")).await;
        let message = match best_effort(&mut output, "Clearing the source field", cleared)? {
            Some(()) => format!("Moved '{}' to '{}'", s.source, s.target),
            None => format!(
                "Copied '{}' to '{}' but could not clear the source",
                s.source, s.target
            ),
        };
        Ok(output.succeed(message))
    }
}

// ---------------------------------------------------------------------------
// merge_it
// ---------------------------------------------------------------------------

struct MergeSettings<'a> {
    sources: Vec<String>,
    target: &'a str,
    separator: &'a str,
    skip_empty: bool,
    overwrite: bool,
}

impl<'a> MergeSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let sources = config.str_list("source_fields")?;
        if sources.is_empty() {
            return Err(HelperError::config("source_fields must list at least one field"));
        }
        Ok(Self {
            sources,
            target: config.require_str("target_field")?,
            separator: config.raw_str_or("separator", " ")?,
            skip_empty: config.bool_or("skip_empty", true)?,
            overwrite: config.bool_or("overwrite", true)?,
        })
    }
}

/// Join several fields into one
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeIt;

#[async_trait]
impl Helper for MergeIt {
    fn name(&self) -> &str {
        "Merge It"
    }

    fn helper_type(&self) -> &str {
        "merge_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Join the values of several contact fields into one field"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required(
                "source_fields",
                PropertySchema::array("Fields to join, in order", PropertySchema::string("Field key")),
            )
            .required("target_field", PropertySchema::string("Field to write the result to"))
            .optional(
                "separator",
                PropertySchema::string("Text placed between values").with_default(json!(" ")),
            )
            .optional(
                "skip_empty",
                PropertySchema::boolean("Leave out empty values").with_default(json!(true)),
            )
            .optional("overwrite", overwrite_property(true))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        MergeSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = MergeSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        // Reads are independent; a failed read counts as an empty value
        let reads = join_all(s.sources.iter().map(|field| read_field(ctx, input, field))).await;
        let mut values = Vec::with_capacity(reads.len());
        for (field, read) in s.sources.iter().zip(reads) {
            let what = format!("Reading field '{}'", field);
            values.push(best_effort(&mut output, &what, read)?.flatten());
        }

        let Some(merged) = join_values(&values, s.separator, s.skip_empty) else {
            return Ok(output.succeed("Source fields are empty, nothing to merge"));
        };

        let writable = may_write(ctx, input, s.target, s.overwrite)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.target))?;
        if !writable {
            return Ok(output.succeed(format!(
                "Field '{}' already has a value, left unchanged",
                s.target
            )));
        }

        write_field(ctx, input, &mut output, s.target, Value::String(merged))
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!(
            "Merged {} fields into '{}'",
            s.sources.len(),
            s.target
        )))
    }
}

// ---------------------------------------------------------------------------
// combine_it
// ---------------------------------------------------------------------------

struct CombineSettings<'a> {
    first: &'a str,
    second: &'a str,
    target: &'a str,
    separator: &'a str,
    skip_empty: bool,
    overwrite: bool,
}

impl<'a> CombineSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            first: config.require_str("first_field")?,
            second: config.require_str("second_field")?,
            target: config.require_str("target_field")?,
            separator: config.raw_str_or("separator", " ")?,
            skip_empty: config.bool_or("skip_empty", true)?,
            overwrite: config.bool_or("overwrite", true)?,
        })
    }
}

/// Join two fields into a third
#[derive(Debug, Default, Clone, Copy)]
pub struct CombineIt;

#[async_trait]
impl Helper for CombineIt {
    fn name(&self) -> &str {
        "Combine It"
    }

    fn helper_type(&self) -> &str {
        "combine_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Combine two contact fields into a third field"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("first_field", PropertySchema::string("First field"))
            .required("second_field", PropertySchema::string("Second field"))
            .required("target_field", PropertySchema::string("Field to write the result to"))
            .optional(
                "separator",
                PropertySchema::string("Text placed between values").with_default(json!(" ")),
            )
            .optional(
                "skip_empty",
                PropertySchema::boolean("Leave out empty values").with_default(json!(true)),
            )
            .optional("overwrite", overwrite_property(true))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        CombineSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = CombineSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let first = read_field(ctx, input, s.first)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.first))?;
        let second = read_field(ctx, input, s.second)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.second))?;

        let Some(combined) = join_values(&[first, second], s.separator, s.skip_empty) else {
            return Ok(output.succeed("Both fields are empty, nothing to combine"));
        };

        let writable = may_write(ctx, input, s.target, s.overwrite)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.target))?;
        if !writable {
            return Ok(output.succeed(format!(
                "Field '{}' already has a value, left unchanged",
                s.target
            )));
        }

        write_field(ctx, input, &mut output, s.target, Value::String(combined))
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!(
            "Combined '{}' and '{}' into '{}'",
            s.first, s.second, s.target
        )))
    }
}

// ---------------------------------------------------------------------------
// field_to_field
// ---------------------------------------------------------------------------

struct Mapping {
    source: String,
    target: String,
}

struct FieldToFieldSettings {
    mappings: Vec<Mapping>,
    overwrite: bool,
}

impl FieldToFieldSettings {
    fn parse(config: &HelperConfig) -> Result<Self, HelperError> {
        let mut mappings = Vec::new();
        for (index, entry) in config.object_list("mappings")?.into_iter().enumerate() {
            let side = |key: &str| {
                entry
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .ok_or_else(|| {
                        HelperError::config(format!("mappings[{}].{} is required", index, key))
                    })
            };
            mappings.push(Mapping {
                source: side("source")?,
                target: side("target")?,
            });
        }
        if mappings.is_empty() {
            return Err(HelperError::config("mappings must contain at least one entry"));
        }
        Ok(Self {
            mappings,
            overwrite: config.bool_or("overwrite", true)?,
        })
    }
}

/// Copy several fields according to a mapping list
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldToField;

#[async_trait]
impl Helper for FieldToField {
    fn name(&self) -> &str {
        "Field to Field"
    }

    fn helper_type(&self) -> &str {
        "field_to_field"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Copy several contact fields to other fields using a list of mappings"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required(
                "mappings",
                PropertySchema::array(
                    "Ordered list of {source, target} pairs",
                    PropertySchema::object("One source → target mapping"),
                ),
            )
            .optional("overwrite", overwrite_property(true))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        FieldToFieldSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = FieldToFieldSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();
        let mut copied = 0;

        for mapping in &s.mappings {
            let value = read_field(ctx, input, &mapping.source)
                .await
                .primary(&mut output, || {
                    format!("Failed to read field '{}'", mapping.source)
                })?;
            let Some(value) = non_empty(value) else {
                output.log(format!("Skipped '{}': field is empty", mapping.source));
                continue;
            };

            let writable = may_write(ctx, input, &mapping.target, s.overwrite)
                .await
                .primary(&mut output, || {
                    format!("Failed to read field '{}'", mapping.target)
                })?;
            if !writable {
                output.log(format!("Skipped '{}': already has a value", mapping.target));
                continue;
            }

            write_field(ctx, input, &mut output, &mapping.target, value)
                .await
                .primary(&mut output, || {
                    format!("Failed to write field '{}'", mapping.target)
                })?;
            copied += 1;
        }

        Ok(output.succeed(format!(
            "Copied {} of {} mapped fields",
            copied,
            s.mappings.len()
        )))
    }
}

// ---------------------------------------------------------------------------
// clear_it
// ---------------------------------------------------------------------------

/// Clear one or more fields
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearIt;

fn clear_fields(config: &HelperConfig) -> Result<Vec<String>, HelperError> {
    let fields = config.str_list("fields")?;
    if fields.is_empty() {
        return Err(HelperError::config("fields must list at least one field"));
    }
    Ok(fields)
}

#[async_trait]
impl Helper for ClearIt {
    fn name(&self) -> &str {
        "Clear It"
    }

    fn helper_type(&self) -> &str {
        "clear_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Clear the value of one or more contact fields"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required(
            "fields",
            PropertySchema::array("Fields to clear", PropertySchema::string("Field key")),
        )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        clear_fields(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let fields = clear_fields(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        for field in &fields {
            let value = read_field(ctx, input, field)
                .await
                .primary(&mut output, || format!("Failed to read field '{}'", field))?;
            if is_empty_value(value.as_ref()) {
                continue;
            }
            write_field(ctx, input, &mut output, field, json!(""))
                .await
                .primary(&mut output, || format!("Failed to clear field '{}'", field))?;
        }

        let message = match output.actions.len() {
            0 => "All fields are already empty".to_string(),
            n => format!("Cleared {} field(s)", n),
        };
        Ok(output.succeed(message))
    }
}

// ---------------------------------------------------------------------------
// default_to_field
// ---------------------------------------------------------------------------

struct DefaultSettings<'a> {
    target: &'a str,
    template: &'a str,
    overwrite: bool,
}

impl<'a> DefaultSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            target: config.require_str("target_field")?,
            template: config.require_str("default_value")?,
            overwrite: config.bool_or("overwrite", false)?,
        })
    }
}

/// Fill a field with a default value
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultToField;

#[async_trait]
impl Helper for DefaultToField {
    fn name(&self) -> &str {
        "Default to Field"
    }

    fn helper_type(&self) -> &str {
        "default_to_field"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Set a field to a default value, with merge fields and date macros"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("target_field", PropertySchema::string("Field to fill"))
            .required(
                "default_value",
                PropertySchema::string("Value to write; supports {{field}}, @Field and {{today}}"),
            )
            .optional("overwrite", overwrite_property(false))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        DefaultSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = DefaultSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let writable = may_write(ctx, input, s.target, s.overwrite)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.target))?;
        if !writable {
            return Ok(output.succeed(format!(
                "Field '{}' already has a value, left unchanged",
                s.target
            )));
        }

        let fields = if s.template.contains("{{") || s.template.contains('@') {
            load_contact(ctx, input)
                .await
                .primary(&mut output, || "Failed to load contact".to_string())?
                .flatten()
        } else {
            FieldMap::new()
        };

        let value = template::render(s.template, &fields);
        if value.trim().is_empty() {
            return Ok(output.succeed("Default value rendered empty, nothing to write"));
        }

        write_field(ctx, input, &mut output, s.target, Value::String(value))
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!("Set default value on '{}'", s.target)))
    }
}
