//! Helper trait and metadata types
//!
//! This module defines the `Helper` trait that every automation rule must
//! implement, the metadata used to build helper catalogs, and the declarative
//! configuration schema consumed by configuration UIs.

use crate::context::ExecContext;
use crate::errors::{ExecutionFailure, HelperError};
use crate::types::{HelperConfig, HelperInput, HelperOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Helper categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelperCategory {
    /// Field manipulation on the contact record
    Contact,
    /// Tag-driven branching
    Tagging,
    /// Goals and automation triggers
    Automation,
    /// Ownership, companies and opt-in status
    Relationship,
    /// Templated notes
    Notes,
    /// Computed metrics
    Analytics,
}

impl HelperCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelperCategory::Contact => "contact",
            HelperCategory::Tagging => "tagging",
            HelperCategory::Automation => "automation",
            HelperCategory::Relationship => "relationship",
            HelperCategory::Notes => "notes",
            HelperCategory::Analytics => "analytics",
        }
    }
}

impl fmt::Display for HelperCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HelperCategory {
    type Err = HelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact" => Ok(HelperCategory::Contact),
            "tagging" => Ok(HelperCategory::Tagging),
            "automation" => Ok(HelperCategory::Automation),
            "relationship" => Ok(HelperCategory::Relationship),
            "notes" => Ok(HelperCategory::Notes),
            "analytics" => Ok(HelperCategory::Analytics),
            other => Err(HelperError::config(format!("unknown category '{}'", other))),
        }
    }
}

/// Schema of one configuration property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    fn of(kind: &str, description: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.into(),
            default: None,
            allowed: None,
            items: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::of("string", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::of("boolean", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::of("number", description)
    }

    pub fn object(description: impl Into<String>) -> Self {
        Self::of("object", description)
    }

    pub fn array(description: impl Into<String>, items: PropertySchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of("array", description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| Value::String((*v).to_string())).collect());
        self
    }
}

/// Declarative configuration schema
///
/// Serialises as `{"type": "object", "properties": {...}, "required": [...]}`.
/// Renaming a property is a breaking change for persisted automations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl Default for ConfigSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Add a required property
    pub fn required(mut self, name: &str, property: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), property);
        self.required.push(name.to_string());
        self
    }

    /// Add an optional property
    pub fn optional(mut self, name: &str, property: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), property);
        self
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// Catalog entry for one helper type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub helper_type: String,
    pub category: HelperCategory,
    pub description: String,
    pub requires_crm: bool,
    /// Allow-listed platform slugs; `None` means every platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_crms: Option<Vec<String>>,
    pub config_schema: ConfigSchema,
}

impl HelperInfo {
    /// Whether the helper may run against the given platform slug
    pub fn supports_platform(&self, slug: &str) -> bool {
        match &self.supported_crms {
            None => true,
            Some(slugs) => slugs.iter().any(|s| s == slug),
        }
    }
}

/// Trait that every automation helper implements
///
/// Implementations are stateless: everything an execution needs arrives in
/// `HelperInput` and everything it produces leaves in `HelperOutput`.
#[async_trait]
pub trait Helper: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Stable type key, used as the registry key and persisted in automations
    fn helper_type(&self) -> &str;

    fn category(&self) -> HelperCategory;

    fn description(&self) -> &str;

    /// Whether a live CRM connection is needed
    fn requires_crm(&self) -> bool {
        true
    }

    /// Platform slugs this helper supports; `None` means all
    fn supported_crms(&self) -> Option<&[&str]> {
        None
    }

    fn config_schema(&self) -> ConfigSchema;

    /// Check the configuration without touching any CRM connection
    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError>;

    /// Run the helper for one contact
    ///
    /// Callers must run `validate_config` first; `execute` assumes a valid
    /// configuration.
    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure>;

    /// Catalog entry for this helper
    fn info(&self) -> HelperInfo {
        HelperInfo {
            name: self.name().to_string(),
            helper_type: self.helper_type().to_string(),
            category: self.category(),
            description: self.description().to_string(),
            requires_crm: self.requires_crm(),
            supported_crms: self
                .supported_crms()
                .map(|slugs| slugs.iter().map(|s| (*s).to_string()).collect()),
            config_schema: self.config_schema(),
        }
    }
}
