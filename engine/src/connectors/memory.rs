//! In-memory CRM connector
//!
//! A complete `CrmConnector` backed by process memory. It is used by the test
//! suites and by `crmflow run` with a JSON fixture. Beyond the contract it
//! offers:
//!
//! - an event journal of goals, automations and opt-status changes,
//! - a restrictable capability set, to exercise `Unsupported` paths,
//! - failure injection per operation and key, to exercise the
//!   degrade-gracefully rules of helpers.

use async_trait::async_trait;
use chrono::Utc;
use sdk::connector::{
    Capability, CapabilitySet, ConnectorInfo, Contact, ContactPage, ContactQuery, CrmConnector,
    CustomField, FieldMap, NewContact, Result, Tag,
};
use sdk::{ConnectorError, ExecContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Side effects that are not visible on the contact record itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectorEvent {
    GoalAchieved {
        contact_id: String,
        goal: String,
        integration: String,
    },
    AutomationTriggered {
        contact_id: String,
        automation_id: String,
    },
    OptStatusChanged {
        contact_id: String,
        opted_in: bool,
        reason: String,
    },
}

/// Seed data for a memory connector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFixture {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: String,
    key: Option<String>,
    error: ConnectorError,
}

#[derive(Debug, Default)]
struct MemoryState {
    contacts: BTreeMap<String, Contact>,
    tags: BTreeMap<String, Tag>,
    custom_fields: Vec<CustomField>,
    opt_status: BTreeMap<String, bool>,
    events: Vec<ConnectorEvent>,
    next_id: u64,
}

/// In-memory connector
#[derive(Debug)]
pub struct MemoryConnector {
    slug: String,
    capabilities: CapabilitySet,
    state: RwLock<MemoryState>,
    failures: RwLock<Vec<FailureRule>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    /// Empty connector supporting every capability
    pub fn new() -> Self {
        Self {
            slug: "memory".to_string(),
            capabilities: CapabilitySet::all(),
            state: RwLock::new(MemoryState::default()),
            failures: RwLock::new(Vec::new()),
        }
    }

    /// Build from a fixture
    pub fn from_fixture(fixture: MemoryFixture) -> Self {
        let mut connector = Self::new();
        if let Some(platform) = fixture.platform {
            connector.slug = platform;
        }
        {
            let mut state = connector.write_state();
            for contact in fixture.contacts {
                state.contacts.insert(contact.id.clone(), contact);
            }
            for tag in fixture.tags {
                state.tags.insert(tag.id.clone(), tag);
            }
            state.custom_fields = fixture.custom_fields;
        }
        connector
    }

    /// Load a JSON fixture file
    pub fn load_fixture(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let fixture: MemoryFixture = serde_json::from_str(&contents)?;
        tracing::debug!(
            "Loaded memory fixture {:?} with {} contacts",
            path,
            fixture.contacts.len()
        );
        Ok(Self::from_fixture(fixture))
    }

    /// Report a different platform slug (for allow-list tests)
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_contact(self, contact: Contact) -> Self {
        self.write_state()
            .contacts
            .insert(contact.id.clone(), contact);
        self
    }

    /// Contact with a set of fields, built from `(key, value)` pairs
    pub fn with_fields(self, contact_id: &str, fields: &[(&str, Value)]) -> Self {
        let mut contact = Contact::new(contact_id);
        for (key, value) in fields {
            contact.set_field(key, value.clone());
        }
        self.with_contact(contact)
    }

    pub fn with_tag(self, tag: Tag) -> Self {
        self.write_state().tags.insert(tag.id.clone(), tag);
        self
    }

    /// Make `operation` fail with `error`, optionally only for one key
    /// (field key, tag id, goal name or automation id).
    pub fn fail_on(&self, operation: &str, key: Option<&str>, error: ConnectorError) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(FailureRule {
                operation: operation.to_string(),
                key: key.map(String::from),
                error,
            });
    }

    pub fn contact(&self, contact_id: &str) -> Option<Contact> {
        self.read_state().contacts.get(contact_id).cloned()
    }

    /// Current value of a field, `None` when unset or the contact is missing
    pub fn field(&self, contact_id: &str, key: &str) -> Option<Value> {
        self.read_state()
            .contacts
            .get(contact_id)
            .and_then(|c| c.field(key))
    }

    pub fn events(&self) -> Vec<ConnectorEvent> {
        self.read_state().events.clone()
    }

    pub fn opt_status(&self, contact_id: &str) -> Option<bool> {
        self.read_state().opt_status.get(contact_id).copied()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Common preamble: context check, capability check, injected failures
    fn guard(
        &self,
        ctx: &ExecContext,
        capability: Capability,
        operation: &str,
        key: Option<&str>,
    ) -> Result<()> {
        ctx.check()?;
        if !self.capabilities.supports(capability) {
            return Err(ConnectorError::Unsupported(operation.to_string()));
        }
        let failures = self.failures.read().unwrap_or_else(|e| e.into_inner());
        let injected = failures.iter().find(|rule| {
            rule.operation == operation
                && match (&rule.key, key) {
                    (None, _) => true,
                    (Some(expected), Some(actual)) => expected == actual,
                    (Some(_), None) => false,
                }
        });
        match injected {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }

    fn with_contact_mut<T>(
        &self,
        contact_id: &str,
        f: impl FnOnce(&mut Contact) -> T,
    ) -> Result<T> {
        let mut state = self.write_state();
        let contact = state
            .contacts
            .get_mut(contact_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("contact {}", contact_id)))?;
        let result = f(contact);
        contact.updated_at = Some(Utc::now());
        Ok(result)
    }
}

fn matches_query(contact: &Contact, query: &ContactQuery) -> bool {
    let tag_ok = query
        .tag
        .as_ref()
        .map_or(true, |tag| contact.tags.iter().any(|t| t == tag));
    tag_ok
        && query
            .filters
            .iter()
            .all(|(key, expected)| contact.field(key).as_ref() == Some(expected))
}

#[async_trait]
impl CrmConnector for MemoryConnector {
    fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            slug: self.slug.clone(),
            name: "In-memory CRM".to_string(),
            capabilities: self.capabilities.clone(),
        }
    }

    async fn list_contacts(&self, ctx: &ExecContext, query: &ContactQuery) -> Result<ContactPage> {
        self.guard(ctx, Capability::Contacts, "list_contacts", None)?;
        let state = self.read_state();
        let matching: Vec<&Contact> = state
            .contacts
            .values()
            .filter(|c| matches_query(c, query))
            .collect();
        let total = matching.len();
        let contacts: Vec<Contact> = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        let end = query.offset + contacts.len();
        Ok(ContactPage {
            contacts,
            total,
            next_offset: (end < total).then_some(end),
        })
    }

    async fn get_contact(&self, ctx: &ExecContext, contact_id: &str) -> Result<Contact> {
        self.guard(ctx, Capability::Contacts, "get_contact", Some(contact_id))?;
        self.contact(contact_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("contact {}", contact_id)))
    }

    async fn create_contact(&self, ctx: &ExecContext, new_contact: &NewContact) -> Result<Contact> {
        self.guard(ctx, Capability::Contacts, "create_contact", None)?;
        let mut state = self.write_state();
        state.next_id += 1;
        let mut contact = Contact::new(format!("mem-{}", state.next_id));
        for (key, value) in &new_contact.fields {
            if key != "id" {
                contact.set_field(key, value.clone());
            }
        }
        contact.tags = new_contact.tags.clone();
        let now = Utc::now();
        contact.created_at = Some(now);
        contact.updated_at = Some(now);
        state.contacts.insert(contact.id.clone(), contact.clone());
        Ok(contact)
    }

    async fn update_contact(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        fields: &FieldMap,
    ) -> Result<Contact> {
        self.guard(ctx, Capability::Contacts, "update_contact", Some(contact_id))?;
        self.with_contact_mut(contact_id, |contact| {
            for (key, value) in fields {
                if key != "id" {
                    contact.set_field(key, value.clone());
                }
            }
            contact.clone()
        })
    }

    async fn delete_contact(&self, ctx: &ExecContext, contact_id: &str) -> Result<()> {
        self.guard(ctx, Capability::Contacts, "delete_contact", Some(contact_id))?;
        let mut state = self.write_state();
        state
            .contacts
            .remove(contact_id)
            .map(|_| ())
            .ok_or_else(|| ConnectorError::NotFound(format!("contact {}", contact_id)))
    }

    async fn get_field(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        key: &str,
    ) -> Result<Option<Value>> {
        self.guard(ctx, Capability::Fields, "get_field", Some(key))?;
        let state = self.read_state();
        let contact = state
            .contacts
            .get(contact_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("contact {}", contact_id)))?;
        Ok(contact.field(key).filter(|v| !v.is_null()))
    }

    async fn set_field(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        key: &str,
        value: Value,
    ) -> Result<()> {
        self.guard(ctx, Capability::Fields, "set_field", Some(key))?;
        self.with_contact_mut(contact_id, |contact| contact.set_field(key, value))
    }

    async fn list_tags(&self, ctx: &ExecContext) -> Result<Vec<Tag>> {
        self.guard(ctx, Capability::Tags, "list_tags", None)?;
        Ok(self.read_state().tags.values().cloned().collect())
    }

    async fn apply_tag(&self, ctx: &ExecContext, contact_id: &str, tag_id: &str) -> Result<()> {
        self.guard(ctx, Capability::Tags, "apply_tag", Some(tag_id))?;
        self.with_contact_mut(contact_id, |contact| {
            if !contact.tags.iter().any(|t| t == tag_id) {
                contact.tags.push(tag_id.to_string());
            }
        })?;
        self.write_state()
            .tags
            .entry(tag_id.to_string())
            .or_insert_with(|| Tag {
                id: tag_id.to_string(),
                name: tag_id.to_string(),
                category: None,
            });
        Ok(())
    }

    async fn remove_tag(&self, ctx: &ExecContext, contact_id: &str, tag_id: &str) -> Result<()> {
        self.guard(ctx, Capability::Tags, "remove_tag", Some(tag_id))?;
        self.with_contact_mut(contact_id, |contact| contact.tags.retain(|t| t != tag_id))
    }

    async fn trigger_automation(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        automation_id: &str,
    ) -> Result<()> {
        self.guard(ctx, Capability::Automations, "trigger_automation", Some(automation_id))?;
        let mut state = self.write_state();
        if !state.contacts.contains_key(contact_id) {
            return Err(ConnectorError::NotFound(format!("contact {}", contact_id)));
        }
        state.events.push(ConnectorEvent::AutomationTriggered {
            contact_id: contact_id.to_string(),
            automation_id: automation_id.to_string(),
        });
        Ok(())
    }

    async fn achieve_goal(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        goal: &str,
        integration: &str,
    ) -> Result<()> {
        self.guard(ctx, Capability::Goals, "achieve_goal", Some(goal))?;
        let mut state = self.write_state();
        if !state.contacts.contains_key(contact_id) {
            return Err(ConnectorError::NotFound(format!("contact {}", contact_id)));
        }
        state.events.push(ConnectorEvent::GoalAchieved {
            contact_id: contact_id.to_string(),
            goal: goal.to_string(),
            integration: integration.to_string(),
        });
        Ok(())
    }

    async fn list_custom_fields(&self, ctx: &ExecContext) -> Result<Vec<CustomField>> {
        self.guard(ctx, Capability::CustomFields, "list_custom_fields", None)?;
        Ok(self.read_state().custom_fields.clone())
    }

    async fn health_check(&self, ctx: &ExecContext) -> Result<()> {
        ctx.check()
    }

    async fn set_opt_in_status(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        opted_in: bool,
        reason: &str,
    ) -> Result<()> {
        self.guard(ctx, Capability::OptIn, "set_opt_in_status", Some(contact_id))?;
        let mut state = self.write_state();
        if !state.contacts.contains_key(contact_id) {
            return Err(ConnectorError::NotFound(format!("contact {}", contact_id)));
        }
        state.opt_status.insert(contact_id.to_string(), opted_in);
        state.events.push(ConnectorEvent::OptStatusChanged {
            contact_id: contact_id.to_string(),
            opted_in,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemoryConnector {
        MemoryConnector::new()
            .with_fields("c-1", &[("first_name", json!("Ada")), ("plan", json!("gold"))])
            .with_fields("c-2", &[("first_name", json!("Grace")), ("plan", json!("free"))])
    }

    #[tokio::test]
    async fn test_field_round_trip() {
        let connector = seeded();
        let ctx = ExecContext::new();

        connector
            .set_field(&ctx, "c-1", "score", json!(10))
            .await
            .unwrap();
        assert_eq!(
            connector.get_field(&ctx, "c-1", "score").await.unwrap(),
            Some(json!(10))
        );
        assert_eq!(connector.get_field(&ctx, "c-1", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_contact_is_not_found() {
        let connector = seeded();
        let err = connector
            .get_field(&ExecContext::new(), "nope", "email")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_contacts_filters_and_pages() {
        let connector = seeded();
        let ctx = ExecContext::new();

        let page = connector
            .list_contacts(&ctx, &ContactQuery::page(1, 0))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.contacts.len(), 1);
        assert_eq!(page.next_offset, Some(1));

        let gold = connector
            .list_contacts(&ctx, &ContactQuery::default().with_filter("plan", json!("gold")))
            .await
            .unwrap();
        assert_eq!(gold.total, 1);
        assert_eq!(gold.contacts[0].id, "c-1");
        assert_eq!(gold.next_offset, None);
    }

    #[tokio::test]
    async fn test_crud() {
        let connector = MemoryConnector::new();
        let ctx = ExecContext::new();

        let mut fields = FieldMap::new();
        fields.insert("email".to_string(), json!("new@example.com"));
        let created = connector
            .create_contact(&ctx, &NewContact { fields, tags: vec!["lead".to_string()] })
            .await
            .unwrap();
        assert_eq!(created.email.as_deref(), Some("new@example.com"));

        let mut update = FieldMap::new();
        update.insert("last_name".to_string(), json!("Lovelace"));
        let updated = connector
            .update_contact(&ctx, &created.id, &update)
            .await
            .unwrap();
        assert_eq!(updated.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(updated.email.as_deref(), Some("new@example.com"));

        connector.delete_contact(&ctx, &created.id).await.unwrap();
        assert!(connector.contact(&created.id).is_none());
    }

    #[tokio::test]
    async fn test_tags_and_events() {
        let connector = seeded();
        let ctx = ExecContext::new();

        connector.apply_tag(&ctx, "c-1", "vip").await.unwrap();
        connector.apply_tag(&ctx, "c-1", "vip").await.unwrap();
        assert_eq!(connector.contact("c-1").unwrap().tags, vec!["vip"]);
        assert_eq!(connector.list_tags(&ctx).await.unwrap().len(), 1);

        connector.remove_tag(&ctx, "c-1", "vip").await.unwrap();
        assert!(connector.contact("c-1").unwrap().tags.is_empty());

        connector
            .achieve_goal(&ctx, "c-1", "purchased", "crmflow")
            .await
            .unwrap();
        assert_eq!(
            connector.events(),
            vec![ConnectorEvent::GoalAchieved {
                contact_id: "c-1".to_string(),
                goal: "purchased".to_string(),
                integration: "crmflow".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_capability_restriction() {
        let connector = seeded().with_capabilities(CapabilitySet::all().without(Capability::OptIn));
        let err = connector
            .set_opt_in_status(&ExecContext::new(), "c-1", true, "form")
            .await
            .unwrap_err();
        assert_eq!(err, ConnectorError::Unsupported("set_opt_in_status".to_string()));
    }

    #[tokio::test]
    async fn test_failure_injection_by_key() {
        let connector = seeded();
        connector.fail_on(
            "set_field",
            Some("email"),
            ConnectorError::Platform("boom".to_string()),
        );
        let ctx = ExecContext::new();

        assert!(connector.set_field(&ctx, "c-1", "email", json!("x")).await.is_err());
        assert!(connector.set_field(&ctx, "c-1", "phone", json!("1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let connector = seeded();
        let ctx = ExecContext::new();
        ctx.cancel();
        let err = connector.get_field(&ctx, "c-1", "plan").await.unwrap_err();
        assert_eq!(err, ConnectorError::Cancelled);
    }

    #[test]
    fn test_fixture_parsing() {
        let fixture: MemoryFixture = serde_json::from_value(json!({
            "platform": "keap",
            "contacts": [
                {"id": "c-9", "email": "x@example.com", "custom_fields": {"orders.count": 3}}
            ]
        }))
        .unwrap();
        let connector = MemoryConnector::from_fixture(fixture);
        assert_eq!(connector.info().slug, "keap");
        assert_eq!(connector.field("c-9", "orders.count"), Some(json!(3)));
    }
}
