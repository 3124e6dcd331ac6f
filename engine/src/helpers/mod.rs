//! Built-in helpers
//!
//! Each helper is a stateless unit struct implementing `sdk::Helper`. The
//! functions in this module wrap the connector calls helpers share, attaching
//! the operation and target to any connector error, and implement the
//! primary/secondary effect conventions:
//!
//! - a failed primary step ends the execution with an `ExecutionFailure`
//!   carrying the output built so far (`PrimaryStep::primary`),
//! - a failed secondary step is logged on the output and skipped
//!   (`best_effort`), unless the execution was cancelled or hit its
//!   deadline, which always ends it.

pub mod analytics;
pub mod automation;
pub mod contact;
pub mod notes;
pub mod relationship;
pub mod tagging;
pub mod template;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use sdk::types::is_empty_value;
use sdk::{
    ActionType, Contact, ExecContext, ExecutionFailure, Helper, HelperConfig, HelperError,
    HelperInput, HelperOutput,
};
use serde_json::Value;
use tracing::warn;

use crate::registry::HelperRegistry;

/// Destination value meaning "compute but do not store"
pub const DO_NOT_SAVE: &str = "do_not_save";

/// Integration namespace for goals when none is configured
pub const DEFAULT_INTEGRATION: &str = "crmflow";

fn boxed<H: Helper + Default + 'static>() -> Box<dyn Helper> {
    Box::new(H::default())
}

/// Register every built-in helper
pub fn register_builtin_helpers(registry: &mut HelperRegistry) -> Result<(), HelperError> {
    // Contact
    registry.register(boxed::<contact::CopyIt>)?;
    registry.register(boxed::<contact::MoveIt>)?;
    registry.register(boxed::<contact::MergeIt>)?;
    registry.register(boxed::<contact::CombineIt>)?;
    registry.register(boxed::<contact::FieldToField>)?;
    registry.register(boxed::<contact::ClearIt>)?;
    registry.register(boxed::<contact::DefaultToField>)?;
    registry.register(boxed::<contact::NameParseIt>)?;
    registry.register(boxed::<contact::FormatIt>)?;
    registry.register(boxed::<contact::MathIt>)?;
    registry.register(boxed::<contact::DateStampIt>)?;
    registry.register(boxed::<contact::SnapshotIt>)?;

    // Tagging
    registry.register(boxed::<tagging::FoundIt>)?;
    registry.register(boxed::<tagging::MatchIt>)?;
    registry.register(boxed::<tagging::TagIt>)?;

    // Automation
    registry.register(boxed::<automation::GoalIt>)?;
    registry.register(boxed::<automation::TriggerIt>)?;

    // Relationship
    registry.register(boxed::<relationship::AssignIt>)?;
    registry.register(boxed::<relationship::CompanyLink>)?;
    registry.register(boxed::<relationship::OptIn>)?;
    registry.register(boxed::<relationship::OptOut>)?;

    // Notes
    registry.register(boxed::<notes::NoteIt>)?;

    // Analytics
    registry.register(boxed::<analytics::RfmCalculation>)?;
    registry.register(boxed::<analytics::CustomerLifetimeValue>)?;
    registry.register(boxed::<analytics::LastClickIt>)?;

    Ok(())
}

/// Turns a failed primary step into an `ExecutionFailure`
pub(crate) trait PrimaryStep<T> {
    fn primary(
        self,
        output: &mut HelperOutput,
        message: impl FnOnce() -> String,
    ) -> Result<T, ExecutionFailure>;
}

impl<T> PrimaryStep<T> for Result<T, HelperError> {
    fn primary(
        self,
        output: &mut HelperOutput,
        message: impl FnOnce() -> String,
    ) -> Result<T, ExecutionFailure> {
        self.map_err(|source| {
            let message = message();
            warn!("{}: {}", message, source);
            ExecutionFailure::new(std::mem::take(output), message, source)
        })
    }
}

/// Configuration rejected inside `execute`
///
/// The executor validates first, so this only fires when a helper is called
/// directly with a bad configuration.
pub(crate) fn invalid_config(source: HelperError) -> ExecutionFailure {
    ExecutionFailure::new(HelperOutput::new(), "Invalid helper configuration", source)
}

/// Run a secondary step: on failure, log it on the output and carry on
///
/// Cancellation and deadline errors are not tolerated and end the execution
/// like a failed primary step.
pub(crate) fn best_effort<T>(
    output: &mut HelperOutput,
    what: &str,
    result: Result<T, HelperError>,
) -> Result<Option<T>, ExecutionFailure> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_interrupt() => Err(e).primary(output, || format!("{} interrupted", what)),
        Err(e) => {
            warn!("{} failed: {}", what, e);
            output.log(format!("{} failed: {}", what, e));
            Ok(None)
        }
    }
}

pub(crate) async fn read_field(
    ctx: &ExecContext,
    input: &HelperInput,
    key: &str,
) -> Result<Option<Value>, HelperError> {
    input
        .connector
        .get_field(ctx, &input.contact_id, key)
        .await
        .map_err(|e| HelperError::connector("get_field", key, e))
}

/// Write a field without recording an action
pub(crate) async fn store_field(
    ctx: &ExecContext,
    input: &HelperInput,
    key: &str,
    value: Value,
) -> Result<(), HelperError> {
    input
        .connector
        .set_field(ctx, &input.contact_id, key, value)
        .await
        .map_err(|e| HelperError::connector("set_field", key, e))
}

/// Write a field and record the `field_updated` action
pub(crate) async fn write_field(
    ctx: &ExecContext,
    input: &HelperInput,
    output: &mut HelperOutput,
    key: &str,
    value: Value,
) -> Result<(), HelperError> {
    store_field(ctx, input, key, value.clone()).await?;
    output.field_updated(key, value);
    Ok(())
}

pub(crate) async fn load_contact(
    ctx: &ExecContext,
    input: &HelperInput,
) -> Result<Contact, HelperError> {
    input
        .connector
        .get_contact(ctx, &input.contact_id)
        .await
        .map_err(|e| HelperError::connector("get_contact", &input.contact_id, e))
}

/// Whether `key` may be written under the overwrite policy
///
/// With `overwrite` set the target is not read at all.
pub(crate) async fn may_write(
    ctx: &ExecContext,
    input: &HelperInput,
    key: &str,
    overwrite: bool,
) -> Result<bool, HelperError> {
    if overwrite {
        return Ok(true);
    }
    let current = read_field(ctx, input, key).await?;
    Ok(is_empty_value(current.as_ref()))
}

pub(crate) async fn apply_tag(
    ctx: &ExecContext,
    input: &HelperInput,
    output: &mut HelperOutput,
    tag: &str,
) -> Result<(), HelperError> {
    input
        .connector
        .apply_tag(ctx, &input.contact_id, tag)
        .await
        .map_err(|e| HelperError::connector("apply_tag", tag, e))?;
    output.action(ActionType::TagApplied, tag, Value::Bool(true));
    Ok(())
}

pub(crate) async fn remove_tag(
    ctx: &ExecContext,
    input: &HelperInput,
    output: &mut HelperOutput,
    tag: &str,
) -> Result<(), HelperError> {
    input
        .connector
        .remove_tag(ctx, &input.contact_id, tag)
        .await
        .map_err(|e| HelperError::connector("remove_tag", tag, e))?;
    output.action(ActionType::TagRemoved, tag, Value::Bool(true));
    Ok(())
}

/// Fire a goal; the action target is `integration:goal`
pub(crate) async fn achieve_goal(
    ctx: &ExecContext,
    input: &HelperInput,
    output: &mut HelperOutput,
    integration: &str,
    goal: &str,
) -> Result<(), HelperError> {
    input
        .connector
        .achieve_goal(ctx, &input.contact_id, goal, integration)
        .await
        .map_err(|e| HelperError::connector("achieve_goal", goal, e))?;
    output.action(
        ActionType::GoalAchieved,
        format!("{}:{}", integration, goal),
        Value::String(goal.to_string()),
    );
    Ok(())
}

/// Destination field from config; `do_not_save` or a blank default mean "skip"
pub(crate) fn destination<'a>(
    config: &'a HelperConfig,
    key: &str,
    default: &'a str,
) -> Result<Option<&'a str>, HelperError> {
    let field = config.str_or(key, default)?.trim();
    Ok((!field.is_empty() && field != DO_NOT_SAVE).then_some(field))
}

/// Round half away from zero to `dp` decimal places
pub(crate) fn round_decimal(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Decimal from the shortest text form of a float (10.005 stays 10.005)
pub(crate) fn decimal_from_f64(value: f64) -> Result<Decimal, HelperError> {
    value
        .to_string()
        .parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_f64(value))
        .ok_or_else(|| HelperError::InvalidData(format!("{} is out of range", value)))
}

/// JSON number for a decimal; whole values become integers
pub(crate) fn decimal_to_json(value: Decimal) -> Value {
    if value.fract().is_zero() {
        if let Some(whole) = value.to_i64() {
            return Value::from(whole);
        }
    }
    value
        .normalize()
        .to_string()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MemoryConnector;
    use sdk::ConnectorError;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_destination_sentinel() {
        let config = HelperConfig::new()
            .with("a", json!("do_not_save"))
            .with("b", json!(" score "))
            .with("c", json!(""));
        assert_eq!(destination(&config, "a", "x").unwrap(), None);
        assert_eq!(destination(&config, "b", "x").unwrap(), Some("score"));
        assert_eq!(destination(&config, "c", "x").unwrap(), Some("x"));
        assert_eq!(destination(&config, "missing", "x").unwrap(), Some("x"));
        assert_eq!(destination(&config, "missing", "").unwrap(), None);
    }

    #[tokio::test]
    async fn test_primary_failure_keeps_output_so_far() {
        let connector = Arc::new(MemoryConnector::new().with_fields("c-1", &[]));
        connector.fail_on("set_field", Some("b"), ConnectorError::RateLimited);
        let input = testing::input(&connector, HelperConfig::new());
        let ctx = ExecContext::new();

        let mut output = HelperOutput::new();
        write_field(&ctx, &input, &mut output, "a", json!(1))
            .await
            .primary(&mut output, || "first".to_string())
            .unwrap();
        let failure = write_field(&ctx, &input, &mut output, "b", json!(2))
            .await
            .primary(&mut output, || "Failed to write b".to_string())
            .unwrap_err();

        assert!(!failure.output.success);
        assert_eq!(failure.output.message, "Failed to write b");
        assert_eq!(failure.output.actions.len(), 1);
        assert!(failure.source.to_string().contains("set_field failed for 'b'"));
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        let half = decimal_from_f64(2.345).unwrap();
        assert_eq!(round_decimal(half, 2).to_string(), "2.35");
        let negative = decimal_from_f64(-2.345).unwrap();
        assert_eq!(round_decimal(negative, 2).to_string(), "-2.35");
        assert_eq!(decimal_to_json(Decimal::from(12)), json!(12));
        assert_eq!(decimal_to_json(round_decimal(half, 1)), json!(2.3));
    }

    #[test]
    fn test_best_effort_logs() {
        let mut output = HelperOutput::new();
        let result: Result<(), HelperError> = Err(HelperError::InvalidData("x".to_string()));
        assert!(best_effort(&mut output, "Clearing source", result).unwrap().is_none());
        assert_eq!(output.logs, vec!["Clearing source failed: Invalid data: x"]);
    }

    #[test]
    fn test_best_effort_does_not_swallow_interrupts() {
        let mut output = HelperOutput::new();
        output.log("earlier step");
        let result: Result<(), HelperError> = Err(HelperError::connector(
            "set_field",
            "temp_phone",
            sdk::ConnectorError::Cancelled,
        ));

        let failure = best_effort(&mut output, "Clearing source", result).unwrap_err();
        assert!(failure.source.is_interrupt());
        assert!(!failure.output.success);
        assert_eq!(failure.output.message, "Clearing source interrupted");
        assert_eq!(failure.output.logs, vec!["earlier step"]);
    }
}
