//! Generic REST connector
//!
//! Talks to a CRM gateway that exposes the capability contract as JSON
//! endpoints under one base URL:
//!
//! | Operation            | Request                                          |
//! |----------------------|--------------------------------------------------|
//! | `health_check`       | `GET /health`                                    |
//! | `list_contacts`      | `GET /contacts?limit&offset&tag&<filter>=<value>`|
//! | `get_contact`        | `GET /contacts/{id}`                             |
//! | `create_contact`     | `POST /contacts`                                 |
//! | `update_contact`     | `PATCH /contacts/{id}` `{"fields": {...}}`       |
//! | `delete_contact`     | `DELETE /contacts/{id}`                          |
//! | `get_field`          | `GET /contacts/{id}/fields/{key}` `{"value"}`    |
//! | `set_field`          | `PUT /contacts/{id}/fields/{key}` `{"value"}`    |
//! | `list_tags`          | `GET /tags`                                      |
//! | `apply_tag`          | `POST /contacts/{id}/tags/{tag}`                 |
//! | `remove_tag`         | `DELETE /contacts/{id}/tags/{tag}`               |
//! | `trigger_automation` | `POST /automations/{id}/trigger`                 |
//! | `achieve_goal`       | `POST /goals`                                    |
//! | `list_custom_fields` | `GET /custom-fields`                             |
//! | `set_opt_in_status`  | `PUT /contacts/{id}/opt-status`                  |
//!
//! Requests carry a bearer token when one is configured. Each request is
//! bounded by the context deadline.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use sdk::connector::{
    Capability, CapabilitySet, ConnectorInfo, Contact, ContactPage, ContactQuery, CrmConnector,
    CustomField, FieldMap, NewContact, Result, Tag,
};
use sdk::types::value_to_string;
use sdk::{ConnectorError, ExecContext};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Request timeout used when the context has no deadline
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct FieldValue {
    #[serde(default)]
    value: Option<Value>,
}

pub struct RestConnector {
    slug: String,
    base_url: Url,
    api_key: Option<String>,
    capabilities: CapabilitySet,
    client: Client,
}

impl std::fmt::Debug for RestConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConnector")
            .field("slug", &self.slug)
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl RestConnector {
    /// Create a connector for `platform` rooted at `base_url`
    pub fn new(platform: impl Into<String>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConnectorError::Platform(format!("invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ConnectorError::Platform(format!(
                "base URL '{}' cannot carry paths",
                base_url
            )));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ConnectorError::Network(e.to_string()))?;

        Ok(Self {
            slug: platform.into(),
            base_url,
            api_key: None,
            capabilities: CapabilitySet::all(),
            client,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Restrict the advertised capabilities; calls outside the set fail locally
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConnectorError::Platform("base URL cannot carry paths".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        ctx: &ExecContext,
        capability: Capability,
        operation: &str,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder> {
        if !self.capabilities.supports(capability) {
            ctx.check()?;
            return Err(ConnectorError::Unsupported(operation.to_string()));
        }
        debug!("{} /{} ({})", method, segments.join("/"), operation);
        self.build(ctx, method, segments)
    }

    fn build(&self, ctx: &ExecContext, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        ctx.check()?;
        let mut request = self
            .client
            .request(method, self.url(segments)?)
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining);
        }
        Ok(request)
    }

    async fn send(&self, ctx: &ExecContext, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                if ctx.deadline().is_some() {
                    ConnectorError::DeadlineExceeded
                } else {
                    ConnectorError::Network(format!("request timed out: {}", e))
                }
            } else {
                ConnectorError::Network(e.to_string())
            }
        })?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        ctx: &ExecContext,
        request: RequestBuilder,
    ) -> Result<T> {
        self.send(ctx, request)
            .await?
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))
    }
}

/// Map a non-2xx response onto the connector error set
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        body.trim().to_string()
    };
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::Authentication(detail),
        StatusCode::NOT_FOUND => ConnectorError::NotFound(detail),
        StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited,
        _ => ConnectorError::Platform(format!("HTTP {}: {}", status.as_u16(), detail)),
    })
}

#[async_trait]
impl CrmConnector for RestConnector {
    fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            slug: self.slug.clone(),
            name: format!("{} (REST)", self.slug),
            capabilities: self.capabilities.clone(),
        }
    }

    async fn list_contacts(&self, ctx: &ExecContext, query: &ContactQuery) -> Result<ContactPage> {
        let mut params = vec![
            ("limit".to_string(), query.limit.to_string()),
            ("offset".to_string(), query.offset.to_string()),
        ];
        if let Some(tag) = &query.tag {
            params.push(("tag".to_string(), tag.clone()));
        }
        for (key, value) in &query.filters {
            params.push((key.clone(), value_to_string(value)));
        }
        let request = self
            .request(ctx, Capability::Contacts, "list_contacts", Method::GET, &["contacts"])?
            .query(&params);
        self.send_json(ctx, request).await
    }

    async fn get_contact(&self, ctx: &ExecContext, contact_id: &str) -> Result<Contact> {
        let request = self.request(
            ctx,
            Capability::Contacts,
            "get_contact",
            Method::GET,
            &["contacts", contact_id],
        )?;
        self.send_json(ctx, request).await
    }

    async fn create_contact(&self, ctx: &ExecContext, contact: &NewContact) -> Result<Contact> {
        let request = self
            .request(ctx, Capability::Contacts, "create_contact", Method::POST, &["contacts"])?
            .json(contact);
        self.send_json(ctx, request).await
    }

    async fn update_contact(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        fields: &FieldMap,
    ) -> Result<Contact> {
        let request = self
            .request(
                ctx,
                Capability::Contacts,
                "update_contact",
                Method::PATCH,
                &["contacts", contact_id],
            )?
            .json(&json!({ "fields": fields }));
        self.send_json(ctx, request).await
    }

    async fn delete_contact(&self, ctx: &ExecContext, contact_id: &str) -> Result<()> {
        let request = self.request(
            ctx,
            Capability::Contacts,
            "delete_contact",
            Method::DELETE,
            &["contacts", contact_id],
        )?;
        self.send(ctx, request).await.map(|_| ())
    }

    async fn get_field(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        key: &str,
    ) -> Result<Option<Value>> {
        let request = self.request(
            ctx,
            Capability::Fields,
            "get_field",
            Method::GET,
            &["contacts", contact_id, "fields", key],
        )?;
        match self.send_json::<FieldValue>(ctx, request).await {
            Ok(field) => Ok(field.value.filter(|v| !v.is_null())),
            // Unset fields come back as 404
            Err(ConnectorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_field(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let request = self
            .request(
                ctx,
                Capability::Fields,
                "set_field",
                Method::PUT,
                &["contacts", contact_id, "fields", key],
            )?
            .json(&json!({ "value": value }));
        self.send(ctx, request).await.map(|_| ())
    }

    async fn list_tags(&self, ctx: &ExecContext) -> Result<Vec<Tag>> {
        let request = self.request(ctx, Capability::Tags, "list_tags", Method::GET, &["tags"])?;
        self.send_json(ctx, request).await
    }

    async fn apply_tag(&self, ctx: &ExecContext, contact_id: &str, tag_id: &str) -> Result<()> {
        let request = self.request(
            ctx,
            Capability::Tags,
            "apply_tag",
            Method::POST,
            &["contacts", contact_id, "tags", tag_id],
        )?;
        self.send(ctx, request).await.map(|_| ())
    }

    async fn remove_tag(&self, ctx: &ExecContext, contact_id: &str, tag_id: &str) -> Result<()> {
        let request = self.request(
            ctx,
            Capability::Tags,
            "remove_tag",
            Method::DELETE,
            &["contacts", contact_id, "tags", tag_id],
        )?;
        self.send(ctx, request).await.map(|_| ())
    }

    async fn trigger_automation(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        automation_id: &str,
    ) -> Result<()> {
        let request = self
            .request(
                ctx,
                Capability::Automations,
                "trigger_automation",
                Method::POST,
                &["automations", automation_id, "trigger"],
            )?
            .json(&json!({ "contact_id": contact_id }));
        self.send(ctx, request).await.map(|_| ())
    }

    async fn achieve_goal(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        goal: &str,
        integration: &str,
    ) -> Result<()> {
        let request = self
            .request(ctx, Capability::Goals, "achieve_goal", Method::POST, &["goals"])?
            .json(&json!({
                "contact_id": contact_id,
                "goal": goal,
                "integration": integration,
            }));
        self.send(ctx, request).await.map(|_| ())
    }

    async fn list_custom_fields(&self, ctx: &ExecContext) -> Result<Vec<CustomField>> {
        let request = self.request(
            ctx,
            Capability::CustomFields,
            "list_custom_fields",
            Method::GET,
            &["custom-fields"],
        )?;
        self.send_json(ctx, request).await
    }

    async fn health_check(&self, ctx: &ExecContext) -> Result<()> {
        let request = self.build(ctx, Method::GET, &["health"])?;
        self.send(ctx, request).await.map(|_| ())
    }

    async fn set_opt_in_status(
        &self,
        ctx: &ExecContext,
        contact_id: &str,
        opted_in: bool,
        reason: &str,
    ) -> Result<()> {
        let request = self
            .request(
                ctx,
                Capability::OptIn,
                "set_opt_in_status",
                Method::PUT,
                &["contacts", contact_id, "opt-status"],
            )?
            .json(&json!({ "opted_in": opted_in, "reason": reason }));
        self.send(ctx, request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_segments() {
        let connector = RestConnector::new("keap", "https://crm.example.com/api/").unwrap();
        let url = connector
            .url(&["contacts", "c 1", "fields", "a/b"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://crm.example.com/api/contacts/c%201/fields/a%2Fb"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(RestConnector::new("keap", "not a url").is_err());
        assert!(RestConnector::new("keap", "mailto:crm@example.com").is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let connector = RestConnector::new("keap", "https://crm.example.com")
            .unwrap()
            .with_api_key("secret-token");
        let debug = format!("{:?}", connector);
        assert!(!debug.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_capability_checked_before_network() {
        // Port 9 is discard; the call must fail locally and never connect
        let connector = RestConnector::new("keap", "http://127.0.0.1:9")
            .unwrap()
            .with_capabilities(CapabilitySet::all().without(Capability::OptIn));
        let err = connector
            .set_opt_in_status(&ExecContext::new(), "c-1", true, "test")
            .await
            .unwrap_err();
        assert_eq!(err, ConnectorError::Unsupported("set_opt_in_status".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let connector = RestConnector::new("keap", "http://127.0.0.1:9").unwrap();
        let ctx = ExecContext::new();
        ctx.cancel();
        let err = connector.get_field(&ctx, "c-1", "email").await.unwrap_err();
        assert_eq!(err, ConnectorError::Cancelled);
    }
}
