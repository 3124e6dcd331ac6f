//! Helper input/output types

use crate::connector::CrmConnector;
use crate::errors::HelperError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Raw helper configuration
///
/// A string-keyed map of JSON values as persisted in an automation
/// definition. The accessors fail closed: a missing key or a value of the
/// wrong shape is a `HelperError::Config` naming the offending key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HelperConfig(Map<String, Value>);

impl HelperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Build from a JSON value; anything but an object is rejected
    pub fn from_value(value: Value) -> Result<Self, HelperError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(HelperError::config(format!(
                "configuration must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Required non-blank string
    pub fn require_str(&self, key: &str) -> Result<&str, HelperError> {
        match self.opt_str(key)? {
            Some(value) => Ok(value),
            None => Err(HelperError::config(format!("{} is required", key))),
        }
    }

    /// Optional string; blank strings count as absent
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, HelperError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(wrong_type(key, "a string", other)),
        }
    }

    /// Optional string with a default
    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, HelperError> {
        Ok(self.opt_str(key)?.unwrap_or(default))
    }

    /// String that may legitimately be blank or whitespace (separators)
    pub fn raw_str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, HelperError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(wrong_type(key, "a string", other)),
        }
    }

    /// Boolean with a default
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, HelperError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(wrong_type(key, "a boolean", other)),
        }
    }

    /// Optional number; numeric strings are accepted
    pub fn opt_number(&self, key: &str) -> Result<Option<f64>, HelperError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value_as_f64(value)
                .map(Some)
                .ok_or_else(|| wrong_type(key, "a number", value)),
        }
    }

    pub fn require_number(&self, key: &str) -> Result<f64, HelperError> {
        self.opt_number(key)?
            .ok_or_else(|| HelperError::config(format!("{} is required", key)))
    }

    pub fn number_or(&self, key: &str, default: f64) -> Result<f64, HelperError> {
        Ok(self.opt_number(key)?.unwrap_or(default))
    }

    /// List of non-blank strings; absent means empty
    pub fn str_list(&self, key: &str) -> Result<Vec<String>, HelperError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                    Value::String(_) => Err(HelperError::config(format!(
                        "{} must not contain empty entries",
                        key
                    ))),
                    other => Err(wrong_type(key, "a list of strings", other)),
                })
                .collect(),
            Some(other) => Err(wrong_type(key, "a list of strings", other)),
        }
    }

    /// List of numbers; absent means empty
    pub fn number_list(&self, key: &str) -> Result<Vec<f64>, HelperError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| value_as_f64(item).ok_or_else(|| wrong_type(key, "a list of numbers", item)))
                .collect(),
            Some(other) => Err(wrong_type(key, "a list of numbers", other)),
        }
    }

    /// List of objects; absent means empty
    pub fn object_list(&self, key: &str) -> Result<Vec<&Map<String, Value>>, HelperError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_object().ok_or_else(|| wrong_type(key, "a list of objects", item)))
                .collect(),
            Some(other) => Err(wrong_type(key, "a list of objects", other)),
        }
    }

    /// String constrained to a fixed set of values
    pub fn choice_or<'a>(
        &'a self,
        key: &str,
        allowed: &[&str],
        default: &'a str,
    ) -> Result<&'a str, HelperError> {
        let value = self.str_or(key, default)?;
        if allowed.contains(&value) {
            Ok(value)
        } else {
            Err(HelperError::config(format!(
                "{} must be one of: {}",
                key,
                allowed.join(", ")
            )))
        }
    }
}

impl From<Map<String, Value>> for HelperConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> HelperError {
    HelperError::config(format!("{} must be {}, got {}", key, expected, json_kind(got)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Interpret a JSON value as a number; numeric strings are accepted
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Text form of a field value
///
/// Strings are returned as-is, null as the empty string, other scalars and
/// structures as their JSON text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// True when a field value is absent, null, or a blank string
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Input to one helper execution
#[derive(Clone)]
pub struct HelperInput {
    pub contact_id: String,
    pub user_id: String,
    pub account_id: String,
    pub helper_id: String,
    pub config: HelperConfig,
    /// Connector bound to the account's CRM credentials
    pub connector: Arc<dyn CrmConnector>,
}

impl HelperInput {
    pub fn new(
        contact_id: impl Into<String>,
        config: HelperConfig,
        connector: Arc<dyn CrmConnector>,
    ) -> Self {
        Self {
            contact_id: contact_id.into(),
            user_id: String::new(),
            account_id: String::new(),
            helper_id: String::new(),
            config,
            connector,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_helper_id(mut self, helper_id: impl Into<String>) -> Self {
        self.helper_id = helper_id.into();
        self
    }
}

impl fmt::Debug for HelperInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperInput")
            .field("contact_id", &self.contact_id)
            .field("user_id", &self.user_id)
            .field("account_id", &self.account_id)
            .field("helper_id", &self.helper_id)
            .field("config", &self.config)
            .field("connector", &self.connector.info().slug)
            .finish()
    }
}

/// Kinds of side effect a helper can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    FieldUpdated,
    TagApplied,
    TagRemoved,
    GoalAchieved,
    AutomationTriggered,
    SnapshotCaptured,
    OptIn,
    OptOut,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionType::FieldUpdated => "field_updated",
            ActionType::TagApplied => "tag_applied",
            ActionType::TagRemoved => "tag_removed",
            ActionType::GoalAchieved => "goal_achieved",
            ActionType::AutomationTriggered => "automation_triggered",
            ActionType::SnapshotCaptured => "snapshot_captured",
            ActionType::OptIn => "opt_in",
            ActionType::OptOut => "opt_out",
        };
        f.write_str(name)
    }
}

/// One side effect actually performed during an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub target: String,
    pub value: Value,
}

impl HelperAction {
    pub fn new(action_type: ActionType, target: impl Into<String>, value: Value) -> Self {
        Self {
            action_type,
            target: target.into(),
            value,
        }
    }
}

/// Result of one helper execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelperOutput {
    pub success: bool,
    pub message: String,
    pub actions: Vec<HelperAction>,
    pub modified_data: BTreeMap<String, Value>,
    pub logs: Vec<String>,
}

impl HelperOutput {
    /// Empty, not-yet-successful output
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field write: one action plus the modified-data entry
    pub fn field_updated(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        self.modified_data.insert(field.clone(), value.clone());
        self.actions
            .push(HelperAction::new(ActionType::FieldUpdated, field, value));
    }

    /// Record a non-field side effect
    pub fn action(&mut self, action_type: ActionType, target: impl Into<String>, value: Value) {
        self.actions.push(HelperAction::new(action_type, target, value));
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Mark the execution successful with a message
    pub fn succeed(mut self, message: impl Into<String>) -> Self {
        self.success = true;
        self.message = message.into();
        self
    }

    /// Actions of one kind
    pub fn actions_of(&self, action_type: ActionType) -> impl Iterator<Item = &HelperAction> {
        self.actions
            .iter()
            .filter(move |action| action.action_type == action_type)
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
