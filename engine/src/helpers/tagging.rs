//! Tag-driven branching helpers
//!
//! `found_it` and `match_it` classify a contact into one of two branches and
//! apply at most one tag and fire at most one goal for that branch. The read
//! that decides the branch is primary; the tag and goal are each best-effort.
//! `tag_it` applies and removes tags as its primary effect.

use async_trait::async_trait;
use sdk::types::{is_empty_value, value_as_f64, value_to_string};
use sdk::{
    ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig, HelperError,
    HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};

use crate::helpers::{
    achieve_goal, apply_tag, best_effort, invalid_config, read_field, remove_tag, PrimaryStep,
    DEFAULT_INTEGRATION,
};

/// Tag id from config; platforms use numeric or string ids
fn tag_id(config: &HelperConfig, key: &str) -> Result<Option<String>, HelperError> {
    match config.get(key) {
        None => Ok(None),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(Some(n.to_string())),
        Some(_) => Ok(config.opt_str(key)?.map(|s| s.trim().to_string())),
    }
}

fn tag_ids(config: &HelperConfig, key: &str) -> Result<Vec<String>, HelperError> {
    match config.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
                Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                _ => Err(HelperError::config(format!(
                    "{} must be a list of tag ids",
                    key
                ))),
            })
            .collect(),
        Some(_) => Err(HelperError::config(format!("{} must be a list of tag ids", key))),
    }
}

/// Tag and goal for one branch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Branch {
    tag: Option<String>,
    goal: Option<String>,
}

impl Branch {
    fn parse(config: &HelperConfig, tag_key: &str, goal_key: &str) -> Result<Self, HelperError> {
        Ok(Self {
            tag: tag_id(config, tag_key)?,
            goal: config.opt_str(goal_key)?.map(String::from),
        })
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.goal.is_none()
    }
}

/// Two-way outcome configuration shared by `found_it` and `match_it`
#[derive(Debug, Clone)]
struct Outcomes {
    positive: Branch,
    negative: Branch,
    integration: String,
}

impl Outcomes {
    fn parse(config: &HelperConfig, keys: [&str; 4]) -> Result<Self, HelperError> {
        let [pos_tag, neg_tag, pos_goal, neg_goal] = keys;
        let outcomes = Self {
            positive: Branch::parse(config, pos_tag, pos_goal)?,
            negative: Branch::parse(config, neg_tag, neg_goal)?,
            integration: config
                .str_or("integration", DEFAULT_INTEGRATION)?
                .to_string(),
        };
        if outcomes.positive.is_empty() && outcomes.negative.is_empty() {
            return Err(HelperError::config(format!(
                "at least one of {} is required",
                keys.join(", ")
            )));
        }
        Ok(outcomes)
    }

    fn schema(schema: ConfigSchema, keys: [&str; 4], labels: [&str; 2]) -> ConfigSchema {
        let [pos_tag, neg_tag, pos_goal, neg_goal] = keys;
        let [pos, neg] = labels;
        schema
            .optional(pos_tag, PropertySchema::string(format!("Tag to apply when {}", pos)))
            .optional(neg_tag, PropertySchema::string(format!("Tag to apply when {}", neg)))
            .optional(pos_goal, PropertySchema::string(format!("Goal to fire when {}", pos)))
            .optional(neg_goal, PropertySchema::string(format!("Goal to fire when {}", neg)))
            .optional(
                "integration",
                PropertySchema::string("Integration namespace for goals")
                    .with_default(json!(DEFAULT_INTEGRATION)),
            )
    }

    /// Run the branch's tag and goal, each best-effort
    async fn apply(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
        output: &mut HelperOutput,
        positive: bool,
    ) -> Result<(), ExecutionFailure> {
        let branch = if positive { &self.positive } else { &self.negative };
        if let Some(tag) = &branch.tag {
            let applied = apply_tag(ctx, input, output, tag).await;
            best_effort(output, &format!("Applying tag '{}'", tag), applied)?;
        }
        if let Some(goal) = &branch.goal {
            let fired = achieve_goal(ctx, input, output, &self.integration, goal).await;
            best_effort(output, &format!("Achieving goal '{}'", goal), fired)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// found_it
// ---------------------------------------------------------------------------

const FOUND_KEYS: [&str; 4] = ["found_tag", "not_found_tag", "found_goal", "not_found_goal"];

/// A value is found when its text form is not empty; whitespace counts
pub fn is_found(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !value_to_string(v).is_empty())
}

/// Branch on whether a field has a value
#[derive(Debug, Default, Clone, Copy)]
pub struct FoundIt;

#[async_trait]
impl Helper for FoundIt {
    fn name(&self) -> &str {
        "Found It"
    }

    fn helper_type(&self) -> &str {
        "found_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Tagging
    }

    fn description(&self) -> &str {
        "Tag the contact or fire a goal depending on whether a field has a value"
    }

    fn config_schema(&self) -> ConfigSchema {
        Outcomes::schema(
            ConfigSchema::new().required("check_field", PropertySchema::string("Field to check")),
            FOUND_KEYS,
            ["the field has a value", "the field is empty"],
        )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        config.require_str("check_field")?;
        Outcomes::parse(config, FOUND_KEYS).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let field = input.config.require_str("check_field").map_err(invalid_config)?;
        let outcomes = Outcomes::parse(&input.config, FOUND_KEYS).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        // Primary: classify
        let value = read_field(ctx, input, field)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", field))?;
        let found = is_found(value.as_ref());

        // Secondary: branch effects
        outcomes.apply(ctx, input, &mut output, found).await?;

        let message = if found {
            format!("Field '{}' has a value", field)
        } else {
            format!("Field '{}' is empty", field)
        };
        Ok(output.succeed(message))
    }
}

// ---------------------------------------------------------------------------
// match_it
// ---------------------------------------------------------------------------

const MATCH_KEYS: [&str; 4] = ["match_tag", "no_match_tag", "match_goal", "no_match_goal"];

const OPERATORS: &[&str] = &[
    "equals",
    "not_equals",
    "contains",
    "starts_with",
    "ends_with",
    "greater_than",
    "less_than",
    "is_empty",
    "not_empty",
];

/// Evaluate a comparison operator against a field value
///
/// Text comparisons treat an absent value as the empty string. Numeric
/// comparisons are false unless both sides are numbers. `equals` compares
/// numerically when both sides are numeric, so "10" equals "10.0".
pub fn evaluate(operator: &str, actual: Option<&Value>, expected: &str, case_sensitive: bool) -> bool {
    let fold = |s: &str| {
        if case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    };
    let actual_text = fold(actual.map(value_to_string).unwrap_or_default().trim());
    let expected_text = fold(expected.trim());
    let numbers = || {
        let a = actual.and_then(value_as_f64)?;
        let b = value_as_f64(&Value::String(expected.to_string()))?;
        Some((a, b))
    };

    match operator {
        "is_empty" => is_empty_value(actual),
        "not_empty" => !is_empty_value(actual),
        "equals" => match numbers() {
            Some((a, b)) => a == b,
            None => actual_text == expected_text,
        },
        "not_equals" => !evaluate("equals", actual, expected, case_sensitive),
        "contains" => actual_text.contains(&expected_text),
        "starts_with" => actual_text.starts_with(&expected_text),
        "ends_with" => actual_text.ends_with(&expected_text),
        "greater_than" => numbers().is_some_and(|(a, b)| a > b),
        "less_than" => numbers().is_some_and(|(a, b)| a < b),
        _ => false,
    }
}

struct MatchSettings<'a> {
    field: &'a str,
    operator: &'a str,
    value: String,
    case_sensitive: bool,
    outcomes: Outcomes,
}

impl<'a> MatchSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let field = config.require_str("field")?;
        config.require_str("operator")?;
        let operator = config.choice_or("operator", OPERATORS, "equals")?;
        let value = config.get("value").map(value_to_string).unwrap_or_default();

        let needs_value = !matches!(operator, "is_empty" | "not_empty");
        if needs_value && value.trim().is_empty() {
            return Err(HelperError::config(format!(
                "value is required for operator '{}'",
                operator
            )));
        }
        if matches!(operator, "greater_than" | "less_than")
            && value_as_f64(&Value::String(value.clone())).is_none()
        {
            return Err(HelperError::config(format!(
                "value must be a number for operator '{}'",
                operator
            )));
        }

        Ok(Self {
            field,
            operator,
            value,
            case_sensitive: config.bool_or("case_sensitive", false)?,
            outcomes: Outcomes::parse(config, MATCH_KEYS)?,
        })
    }
}

/// Branch on a comparison against a field value
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchIt;

#[async_trait]
impl Helper for MatchIt {
    fn name(&self) -> &str {
        "Match It"
    }

    fn helper_type(&self) -> &str {
        "match_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Tagging
    }

    fn description(&self) -> &str {
        "Tag the contact or fire a goal depending on how a field compares to a value"
    }

    fn config_schema(&self) -> ConfigSchema {
        Outcomes::schema(
            ConfigSchema::new()
                .required("field", PropertySchema::string("Field to compare"))
                .required(
                    "operator",
                    PropertySchema::string("Comparison operator").with_enum(OPERATORS),
                )
                .optional(
                    "value",
                    PropertySchema::string("Value to compare with; not used by empty checks"),
                )
                .optional(
                    "case_sensitive",
                    PropertySchema::boolean("Compare text case-sensitively").with_default(json!(false)),
                ),
            MATCH_KEYS,
            ["the comparison matches", "the comparison does not match"],
        )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        MatchSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = MatchSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        // Primary: classify
        let value = read_field(ctx, input, s.field)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.field))?;
        let matched = evaluate(s.operator, value.as_ref(), &s.value, s.case_sensitive);

        // Secondary: branch effects
        s.outcomes.apply(ctx, input, &mut output, matched).await?;

        let verdict = if matched { "matched" } else { "did not match" };
        Ok(output.succeed(format!(
            "Field '{}' {} ({})",
            s.field, verdict, s.operator
        )))
    }
}

// ---------------------------------------------------------------------------
// tag_it
// ---------------------------------------------------------------------------

struct TagSettings {
    apply: Vec<String>,
    remove: Vec<String>,
}

impl TagSettings {
    fn parse(config: &HelperConfig) -> Result<Self, HelperError> {
        let settings = Self {
            apply: tag_ids(config, "apply_tags")?,
            remove: tag_ids(config, "remove_tags")?,
        };
        if settings.apply.is_empty() && settings.remove.is_empty() {
            return Err(HelperError::config(
                "at least one tag in apply_tags or remove_tags is required",
            ));
        }
        Ok(settings)
    }
}

/// Apply and remove tags
#[derive(Debug, Default, Clone, Copy)]
pub struct TagIt;

#[async_trait]
impl Helper for TagIt {
    fn name(&self) -> &str {
        "Tag It"
    }

    fn helper_type(&self) -> &str {
        "tag_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Tagging
    }

    fn description(&self) -> &str {
        "Apply and remove tags on the contact"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional(
                "apply_tags",
                PropertySchema::array("Tags to apply", PropertySchema::string("Tag id")),
            )
            .optional(
                "remove_tags",
                PropertySchema::array("Tags to remove", PropertySchema::string("Tag id")),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        TagSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = TagSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        for tag in &s.apply {
            apply_tag(ctx, input, &mut output, tag)
                .await
                .primary(&mut output, || format!("Failed to apply tag '{}'", tag))?;
        }
        for tag in &s.remove {
            remove_tag(ctx, input, &mut output, tag)
                .await
                .primary(&mut output, || format!("Failed to remove tag '{}'", tag))?;
        }

        Ok(output.succeed(format!(
            "Applied {} tag(s), removed {} tag(s)",
            s.apply.len(),
            s.remove.len()
        )))
    }
}
