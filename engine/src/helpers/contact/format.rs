//! Value formatting, arithmetic and date stamping

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use sdk::types::{is_empty_value, value_as_f64, value_to_string};
use sdk::{
    ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig, HelperError,
    HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};

use crate::helpers::{
    decimal_from_f64, decimal_to_json, invalid_config, may_write, read_field, round_decimal,
    write_field, PrimaryStep,
};

const FORMATS: &[&str] = &["upper", "lower", "title", "trim", "sentence", "digits_only"];

/// Apply one of the text formats
pub fn apply_format(text: &str, format: &str) -> String {
    match format {
        "upper" => text.to_uppercase(),
        "lower" => text.to_lowercase(),
        "title" => text
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" "),
        "trim" => text.split_whitespace().collect::<Vec<_>>().join(" "),
        "sentence" => {
            let lower = text.trim().to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        "digits_only" => text.chars().filter(char::is_ascii_digit).collect(),
        _ => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// format_it
// ---------------------------------------------------------------------------

struct FormatSettings<'a> {
    field: &'a str,
    format: &'a str,
    target: &'a str,
}

impl<'a> FormatSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let field = config.require_str("field")?;
        config.require_str("format")?;
        Ok(Self {
            field,
            format: config.choice_or("format", FORMATS, "trim")?,
            target: config.str_or("target_field", field)?,
        })
    }
}

/// Reformat a text field
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatIt;

#[async_trait]
impl Helper for FormatIt {
    fn name(&self) -> &str {
        "Format It"
    }

    fn helper_type(&self) -> &str {
        "format_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Change the case or shape of a text field"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("field", PropertySchema::string("Field to format"))
            .required(
                "format",
                PropertySchema::string("Format to apply").with_enum(FORMATS),
            )
            .optional(
                "target_field",
                PropertySchema::string("Field to write to; defaults to the formatted field"),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        FormatSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = FormatSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let value = read_field(ctx, input, s.field)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.field))?;
        let Some(value) = value.filter(|v| !is_empty_value(Some(v))) else {
            return Ok(output.succeed(format!("Field '{}' is empty, nothing to format", s.field)));
        };

        let original = value_to_string(&value);
        let formatted = apply_format(&original, s.format);
        if formatted == original && s.target == s.field {
            return Ok(output.succeed(format!("Field '{}' is already formatted", s.field)));
        }

        write_field(ctx, input, &mut output, s.target, Value::String(formatted))
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!("Applied '{}' format to '{}'", s.format, s.field)))
    }
}

// ---------------------------------------------------------------------------
// math_it
// ---------------------------------------------------------------------------

const OPERATIONS: &[&str] = &["add", "subtract", "multiply", "divide"];

struct MathSettings<'a> {
    field: &'a str,
    operation: &'a str,
    operand: f64,
    target: &'a str,
    decimals: u32,
}

impl<'a> MathSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let field = config.require_str("field")?;
        config.require_str("operation")?;
        let operation = config.choice_or("operation", OPERATIONS, "add")?;
        let operand = config.require_number("operand")?;
        if operation == "divide" && operand == 0.0 {
            return Err(HelperError::config("operand must not be zero for divide"));
        }
        let decimals = config.number_or("decimals", 2.0)?;
        if !(0.0..=10.0).contains(&decimals) || decimals.fract() != 0.0 {
            return Err(HelperError::config("decimals must be a whole number from 0 to 10"));
        }
        Ok(Self {
            field,
            operation,
            operand,
            target: config.str_or("target_field", field)?,
            decimals: decimals as u32,
        })
    }
}

/// Arithmetic on a numeric field
#[derive(Debug, Default, Clone, Copy)]
pub struct MathIt;

impl MathIt {
    fn compute(current: f64, s: &MathSettings<'_>) -> Result<Value, HelperError> {
        let current = decimal_from_f64(current)?;
        let operand = decimal_from_f64(s.operand)?;
        let result = match s.operation {
            "add" => current.checked_add(operand),
            "subtract" => current.checked_sub(operand),
            "multiply" => current.checked_mul(operand),
            _ => current.checked_div(operand),
        }
        .ok_or_else(|| HelperError::InvalidData(format!("{} overflowed", s.operation)))?;
        Ok(decimal_to_json(round_decimal(result, s.decimals)))
    }
}

#[async_trait]
impl Helper for MathIt {
    fn name(&self) -> &str {
        "Math It"
    }

    fn helper_type(&self) -> &str {
        "math_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Add, subtract, multiply or divide a numeric field"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("field", PropertySchema::string("Numeric field to read"))
            .required(
                "operation",
                PropertySchema::string("Operation to apply").with_enum(OPERATIONS),
            )
            .required("operand", PropertySchema::number("Second operand"))
            .optional(
                "target_field",
                PropertySchema::string("Field to write to; defaults to the source field"),
            )
            .optional(
                "decimals",
                PropertySchema::number("Decimal places to round to").with_default(json!(2)),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        MathSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = MathSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let value = read_field(ctx, input, s.field)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.field))?;
        let current = match value.filter(|v| !is_empty_value(Some(v))) {
            None => 0.0,
            Some(v) => value_as_f64(&v)
                .ok_or_else(|| {
                    HelperError::InvalidData(format!(
                        "field '{}' is not a number: {}",
                        s.field,
                        value_to_string(&v)
                    ))
                })
                .primary(&mut output, || format!("Field '{}' is not numeric", s.field))?,
        };

        let result = Self::compute(current, &s)
            .primary(&mut output, || format!("Could not {} '{}'", s.operation, s.field))?;
        write_field(ctx, input, &mut output, s.target, result.clone())
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!("Set '{}' to {}", s.target, result)))
    }
}

// ---------------------------------------------------------------------------
// date_stamp_it
// ---------------------------------------------------------------------------

struct StampSettings<'a> {
    target: &'a str,
    now: bool,
    format: Option<&'a str>,
    overwrite: bool,
}

impl<'a> StampSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let format = config.opt_str("date_format")?;
        if let Some(f) = format {
            if StrftimeItems::new(f).any(|item| matches!(item, Item::Error)) {
                return Err(HelperError::config(format!("date_format '{}' is not valid", f)));
            }
        }
        Ok(Self {
            target: config.require_str("target_field")?,
            now: config.choice_or("value", &["now", "today"], "today")? == "now",
            format,
            overwrite: config.bool_or("overwrite", true)?,
        })
    }
}

/// Write the current date or time into a field
#[derive(Debug, Default, Clone, Copy)]
pub struct DateStampIt;

#[async_trait]
impl Helper for DateStampIt {
    fn name(&self) -> &str {
        "Date Stamp It"
    }

    fn helper_type(&self) -> &str {
        "date_stamp_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Stamp the current date or time into a contact field"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("target_field", PropertySchema::string("Field to stamp"))
            .optional(
                "value",
                PropertySchema::string("Stamp the date or the full timestamp")
                    .with_enum(&["now", "today"])
                    .with_default(json!("today")),
            )
            .optional(
                "date_format",
                PropertySchema::string("strftime format; YYYY-MM-DD for today, RFC 3339 for now"),
            )
            .optional(
                "overwrite",
                PropertySchema::boolean("Replace the target field when it already has a value")
                    .with_default(json!(true)),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        StampSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = StampSettings::parse(&input.config).map_err(invalid_config)?;
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

        let now = Utc::now();
        let stamp = match (s.format, s.now) {
            (Some(format), _) => now.format(format).to_string(),
            (None, true) => now.to_rfc3339(),
            (None, false) => now.format("%Y-%m-%d").to_string(),
        };

        write_field(ctx, input, &mut output, s.target, Value::String(stamp.clone()))
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!("Stamped '{}' with {}", s.target, stamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MemoryConnector;
    use crate::helpers::testing::{config, run};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn connector(fields: &[(&str, Value)]) -> Arc<MemoryConnector> {
        Arc::new(MemoryConnector::new().with_fields("c-1", fields))
    }

    #[test]
    fn test_apply_format() {
        assert_eq!(apply_format("hello World", "upper"), "HELLO WORLD");
        assert_eq!(apply_format("hello WORLD", "title"), "Hello World");
        assert_eq!(apply_format("  too   many  spaces ", "trim"), "too many spaces");
        assert_eq!(apply_format("hELLO there", "sentence"), "Hello there");
        assert_eq!(apply_format("+1 (555) 010-0199", "digits_only"), "15550100199");
    }

    #[tokio::test]
    async fn test_format_it_in_place() {
        let crm = connector(&[("city", json!("new york"))]);
        let output = run(
            &FormatIt,
            &crm,
            config(&[("field", json!("city")), ("format", json!("title"))]),
        )
        .await
        .unwrap();

        assert_eq!(output.actions.len(), 1);
        assert_eq!(crm.field("c-1", "city"), Some(json!("New York")));
    }

    #[tokio::test]
    async fn test_format_it_unchanged_value_is_not_written() {
        let crm = connector(&[("code", json!("ABC"))]);
        let output = run(
            &FormatIt,
            &crm,
            config(&[("field", json!("code")), ("format", json!("upper"))]),
        )
        .await
        .unwrap();

        assert!(output.success);
        assert!(output.actions.is_empty());
    }

    #[test]
    fn test_format_it_rejects_unknown_format() {
        let err = FormatIt
            .validate_config(&config(&[("field", json!("x")), ("format", json!("reverse"))]))
            .unwrap_err();
        assert!(err.to_string().contains("format must be one of"));
    }

    #[tokio::test]
    async fn test_math_it_rounds_half_away_from_zero() {
        let crm = connector(&[("score", json!("10.005"))]);
        run(
            &MathIt,
            &crm,
            config(&[
                ("field", json!("score")),
                ("operation", json!("multiply")),
                ("operand", json!(1)),
                ("target_field", json!("rounded")),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(crm.field("c-1", "rounded"), Some(json!(10.01)));
    }

    #[tokio::test]
    async fn test_math_it_empty_field_counts_as_zero() {
        let crm = connector(&[]);
        run(
            &MathIt,
            &crm,
            config(&[
                ("field", json!("points")),
                ("operation", json!("add")),
                ("operand", json!(5)),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(crm.field("c-1", "points"), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_math_it_non_numeric_is_primary_failure() {
        let crm = connector(&[("points", json!("lots"))]);
        let failure = run(
            &MathIt,
            &crm,
            config(&[
                ("field", json!("points")),
                ("operation", json!("add")),
                ("operand", json!(1)),
            ]),
        )
        .await
        .unwrap_err();

        assert!(!failure.output.success);
        assert!(matches!(failure.source, HelperError::InvalidData(_)));
        assert_eq!(crm.field("c-1", "points"), Some(json!("lots")));
    }

    #[test]
    fn test_math_it_divide_by_zero_is_config_error() {
        let err = MathIt
            .validate_config(&config(&[
                ("field", json!("points")),
                ("operation", json!("divide")),
                ("operand", json!(0)),
            ]))
            .unwrap_err();
        assert!(matches!(err, HelperError::Config(_)));
    }

    #[tokio::test]
    async fn test_date_stamp_it_today() {
        let crm = connector(&[]);
        run(&DateStampIt, &crm, config(&[("target_field", json!("last_seen"))]))
            .await
            .unwrap();

        let stamp = crm.field("c-1", "last_seen").unwrap();
        let text = stamp.as_str().unwrap();
        assert!(NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn test_date_stamp_it_rejects_bad_format() {
        let err = DateStampIt
            .validate_config(&config(&[
                ("target_field", json!("x")),
                ("date_format", json!("%Q")),
            ]))
            .unwrap_err();
        assert!(err.to_string().contains("date_format"));
    }
}
