//! CRM capability contract
//!
//! This module defines the `CrmConnector` trait that every supported CRM
//! platform implements, and the contact data types that flow through it.
//! Helpers only ever talk to this trait; platform quirks (rate limits,
//! field-name translation, token refresh) stay inside the implementation.
//!
//! Every I/O operation has a default implementation that returns
//! `ConnectorError::Unsupported`, so a connector only overrides the
//! capability groups its platform actually provides.

use crate::context::ExecContext;
use crate::errors::ConnectorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Result type for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Field name → value map used for partial updates and flattened contacts
pub type FieldMap = BTreeMap<String, Value>;

/// Capability groups a connector may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Contact list/get/create/update/delete
    Contacts,
    /// Single-field get/set
    Fields,
    /// Tag listing and apply/remove
    Tags,
    /// Triggering named automations
    Automations,
    /// Achieving goals under an integration namespace
    Goals,
    /// Custom field definitions
    CustomFields,
    /// Opt-in / opt-out signalling
    OptIn,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Contacts,
        Capability::Fields,
        Capability::Tags,
        Capability::Automations,
        Capability::Goals,
        Capability::CustomFields,
        Capability::OptIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Contacts => "contacts",
            Capability::Fields => "fields",
            Capability::Tags => "tags",
            Capability::Automations => "automations",
            Capability::Goals => "goals",
            Capability::CustomFields => "custom_fields",
            Capability::OptIn => "opt_in",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of capabilities reported by a connector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.0.remove(&capability);
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Connector metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    /// Stable platform slug (e.g. "keap", "hubspot", "memory")
    pub slug: String,
    /// Human-readable platform name
    pub name: String,
    pub capabilities: CapabilitySet,
}

/// A CRM contact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Names of the standard (non-custom) contact fields
pub const STANDARD_FIELDS: [&str; 8] = [
    "id",
    "first_name",
    "last_name",
    "email",
    "phone",
    "company",
    "job_title",
    "owner_id",
];

impl Contact {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Value of a standard or custom field, `None` when unset
    pub fn field(&self, key: &str) -> Option<Value> {
        let standard = match key {
            "id" => Some(self.id.clone()),
            "first_name" => self.first_name.clone(),
            "last_name" => self.last_name.clone(),
            "email" => self.email.clone(),
            "phone" => self.phone.clone(),
            "company" => self.company.clone(),
            "job_title" => self.job_title.clone(),
            "owner_id" => self.owner_id.clone(),
            _ => return self.custom_fields.get(key).cloned(),
        };
        standard.map(Value::String)
    }

    /// Set a standard or custom field. A null value or non-string value for a
    /// standard field clears or stringifies it.
    pub fn set_field(&mut self, key: &str, value: Value) {
        let as_text = match &value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        match key {
            "id" => {
                if let Some(id) = as_text {
                    self.id = id;
                }
            }
            "first_name" => self.first_name = as_text,
            "last_name" => self.last_name = as_text,
            "email" => self.email = as_text,
            "phone" => self.phone = as_text,
            "company" => self.company = as_text,
            "job_title" => self.job_title = as_text,
            "owner_id" => self.owner_id = as_text,
            _ => {
                if value.is_null() {
                    self.custom_fields.remove(key);
                } else {
                    self.custom_fields.insert(key.to_string(), value);
                }
            }
        }
    }

    /// Merge standard and custom fields into one map
    ///
    /// Standard fields win over custom fields that share their name.
    pub fn flatten(&self) -> FieldMap {
        let mut flat = self.custom_fields.clone();
        for key in STANDARD_FIELDS {
            if let Some(value) = self.field(key) {
                flat.insert(key.to_string(), value);
            }
        }
        if !self.tags.is_empty() {
            flat.insert("tags".to_string(), Value::String(self.tags.join(", ")));
        }
        if let Some(created) = self.created_at {
            flat.insert("created_at".to_string(), Value::String(created.to_rfc3339()));
        }
        if let Some(updated) = self.updated_at {
            flat.insert("updated_at".to_string(), Value::String(updated.to_rfc3339()));
        }
        flat
    }
}

/// Fields for creating a contact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Query options for listing contacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactQuery {
    pub limit: usize,
    pub offset: usize,
    /// Exact-match field filters
    #[serde(default)]
    pub filters: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Default for ContactQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            filters: FieldMap::new(),
            tag: None,
        }
    }
}

impl ContactQuery {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// One page of contacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    pub total: usize,
    /// Offset of the next page, `None` on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

/// A tag defined in the CRM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A custom field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub key: String,
    pub label: String,
    /// Platform field type (text, number, date, ...)
    pub field_type: String,
}

/// CRM connector trait that every platform implements
///
/// All I/O methods take the execution context first; implementations must
/// call `ctx.check()` before doing work and bound network calls by
/// `ctx.remaining()`.
#[async_trait]
pub trait CrmConnector: Send + Sync {
    /// Platform slug, name and capability set
    fn info(&self) -> ConnectorInfo;

    /// Shorthand for `info().capabilities.supports(..)`
    fn supports(&self, capability: Capability) -> bool {
        self.info().capabilities.supports(capability)
    }

    async fn list_contacts(&self, _ctx: &ExecContext, _query: &ContactQuery) -> Result<ContactPage> {
        Err(ConnectorError::Unsupported("list_contacts".to_string()))
    }

    async fn get_contact(&self, _ctx: &ExecContext, _contact_id: &str) -> Result<Contact> {
        Err(ConnectorError::Unsupported("get_contact".to_string()))
    }

    async fn create_contact(&self, _ctx: &ExecContext, _contact: &NewContact) -> Result<Contact> {
        Err(ConnectorError::Unsupported("create_contact".to_string()))
    }

    /// Merge `fields` into the contact, leaving other fields untouched
    async fn update_contact(
        &self,
        _ctx: &ExecContext,
        _contact_id: &str,
        _fields: &FieldMap,
    ) -> Result<Contact> {
        Err(ConnectorError::Unsupported("update_contact".to_string()))
    }

    async fn delete_contact(&self, _ctx: &ExecContext, _contact_id: &str) -> Result<()> {
        Err(ConnectorError::Unsupported("delete_contact".to_string()))
    }

    /// Current value of one field; `Ok(None)` when the field is not set
    async fn get_field(
        &self,
        _ctx: &ExecContext,
        _contact_id: &str,
        _key: &str,
    ) -> Result<Option<Value>> {
        Err(ConnectorError::Unsupported("get_field".to_string()))
    }

    async fn set_field(
        &self,
        _ctx: &ExecContext,
        _contact_id: &str,
        _key: &str,
        _value: Value,
    ) -> Result<()> {
        Err(ConnectorError::Unsupported("set_field".to_string()))
    }

    async fn list_tags(&self, _ctx: &ExecContext) -> Result<Vec<Tag>> {
        Err(ConnectorError::Unsupported("list_tags".to_string()))
    }

    async fn apply_tag(&self, _ctx: &ExecContext, _contact_id: &str, _tag_id: &str) -> Result<()> {
        Err(ConnectorError::Unsupported("apply_tag".to_string()))
    }

    async fn remove_tag(&self, _ctx: &ExecContext, _contact_id: &str, _tag_id: &str) -> Result<()> {
        Err(ConnectorError::Unsupported("remove_tag".to_string()))
    }

    async fn trigger_automation(
        &self,
        _ctx: &ExecContext,
        _contact_id: &str,
        _automation_id: &str,
    ) -> Result<()> {
        Err(ConnectorError::Unsupported("trigger_automation".to_string()))
    }

    /// Fire a named goal under an integration namespace
    async fn achieve_goal(
        &self,
        _ctx: &ExecContext,
        _contact_id: &str,
        _goal: &str,
        _integration: &str,
    ) -> Result<()> {
        Err(ConnectorError::Unsupported("achieve_goal".to_string()))
    }

    async fn list_custom_fields(&self, _ctx: &ExecContext) -> Result<Vec<CustomField>> {
        Err(ConnectorError::Unsupported("list_custom_fields".to_string()))
    }

    async fn health_check(&self, _ctx: &ExecContext) -> Result<()> {
        Err(ConnectorError::Unsupported("health_check".to_string()))
    }

    async fn set_opt_in_status(
        &self,
        _ctx: &ExecContext,
        _contact_id: &str,
        _opted_in: bool,
        _reason: &str,
    ) -> Result<()> {
        Err(ConnectorError::Unsupported("set_opt_in_status".to_string()))
    }
}
