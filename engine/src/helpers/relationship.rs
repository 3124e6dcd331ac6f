//! Ownership, company and opt-in helpers

use async_trait::async_trait;
use sdk::{
    ActionType, ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig,
    HelperError, HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};

use crate::helpers::{best_effort, invalid_config, may_write, write_field, PrimaryStep};

/// Id values may be configured as numbers or strings
fn id_value(config: &HelperConfig, key: &str) -> Result<String, HelperError> {
    match config.get(key) {
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        _ => config.require_str(key).map(|s| s.trim().to_string()),
    }
}

// ---------------------------------------------------------------------------
// assign_it
// ---------------------------------------------------------------------------

struct AssignSettings<'a> {
    owner: String,
    field: &'a str,
    overwrite: bool,
}

impl<'a> AssignSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            owner: id_value(config, "owner_id")?,
            field: config.str_or("owner_field", "owner_id")?,
            overwrite: config.bool_or("overwrite", true)?,
        })
    }
}

/// Assign the contact to an owner
#[derive(Debug, Default, Clone, Copy)]
pub struct AssignIt;

#[async_trait]
impl Helper for AssignIt {
    fn name(&self) -> &str {
        "Assign It"
    }

    fn helper_type(&self) -> &str {
        "assign_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Relationship
    }

    fn description(&self) -> &str {
        "Assign the contact to a user"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("owner_id", PropertySchema::string("User id of the new owner"))
            .optional(
                "owner_field",
                PropertySchema::string("Field holding the owner").with_default(json!("owner_id")),
            )
            .optional(
                "overwrite",
                PropertySchema::boolean("Reassign contacts that already have an owner")
                    .with_default(json!(true)),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        AssignSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = AssignSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let writable = may_write(ctx, input, s.field, s.overwrite)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.field))?;
        if !writable {
            return Ok(output.succeed("Contact already has an owner, left unchanged"));
        }

        write_field(ctx, input, &mut output, s.field, Value::String(s.owner.clone()))
            .await
            .primary(&mut output, || format!("Failed to assign owner '{}'", s.owner))?;
        Ok(output.succeed(format!("Assigned contact to owner '{}'", s.owner)))
    }
}

// ---------------------------------------------------------------------------
// company_link
// ---------------------------------------------------------------------------

struct CompanySettings<'a> {
    company_id: String,
    id_field: &'a str,
    company_name: Option<&'a str>,
    name_field: &'a str,
    overwrite: bool,
}

impl<'a> CompanySettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            company_id: id_value(config, "company_id")?,
            id_field: config.str_or("company_id_field", "company_id")?,
            company_name: config.opt_str("company_name")?,
            name_field: config.str_or("company_name_field", "company")?,
            overwrite: config.bool_or("overwrite", true)?,
        })
    }
}

/// Link the contact to a company record
#[derive(Debug, Default, Clone, Copy)]
pub struct CompanyLink;

#[async_trait]
impl Helper for CompanyLink {
    fn name(&self) -> &str {
        "Company Link"
    }

    fn helper_type(&self) -> &str {
        "company_link"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Relationship
    }

    fn description(&self) -> &str {
        "Link the contact to a company"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("company_id", PropertySchema::string("Company record id"))
            .optional(
                "company_id_field",
                PropertySchema::string("Field holding the company id").with_default(json!("company_id")),
            )
            .optional("company_name", PropertySchema::string("Company name to store"))
            .optional(
                "company_name_field",
                PropertySchema::string("Field holding the company name").with_default(json!("company")),
            )
            .optional(
                "overwrite",
                PropertySchema::boolean("Relink contacts that already have a company")
                    .with_default(json!(true)),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        CompanySettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = CompanySettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        // Primary: the id link
        let writable = may_write(ctx, input, s.id_field, s.overwrite)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.id_field))?;
        if !writable {
            return Ok(output.succeed("Contact is already linked to a company, left unchanged"));
        }
        write_field(
            ctx,
            input,
            &mut output,
            s.id_field,
            Value::String(s.company_id.clone()),
        )
        .await
        .primary(&mut output, || {
            format!("Failed to link company '{}'", s.company_id)
        })?;

        // Secondary: the display name
        if let Some(name) = s.company_name {
            let written = write_field(
                ctx,
                input,
                &mut output,
                s.name_field,
                Value::String(name.to_string()),
            )
            .await;
            best_effort(&mut output, "Writing the company name", written)?;
        }

        Ok(output.succeed(format!("Linked contact to company '{}'", s.company_id)))
    }
}

// ---------------------------------------------------------------------------
// opt_in / opt_out
// ---------------------------------------------------------------------------

/// Shared body of the opt-in and opt-out helpers
async fn set_opt_status(
    ctx: &ExecContext,
    input: &HelperInput,
    opted_in: bool,
    default_reason: &str,
) -> Result<HelperOutput, ExecutionFailure> {
    let reason = input
        .config
        .str_or("reason", default_reason)
        .map_err(invalid_config)?;
    let mut output = HelperOutput::new();
    let (action, verb) = if opted_in {
        (ActionType::OptIn, "opt in")
    } else {
        (ActionType::OptOut, "opt out")
    };

    input
        .connector
        .set_opt_in_status(ctx, &input.contact_id, opted_in, reason)
        .await
        .map_err(|e| HelperError::connector("set_opt_in_status", &input.contact_id, e))
        .primary(&mut output, || format!("Failed to {} contact", verb))?;
    output.action(action, input.contact_id.clone(), Value::String(reason.to_string()));

    let message = if opted_in {
        "Contact opted in"
    } else {
        "Contact opted out"
    };
    Ok(output.succeed(message))
}

fn reason_schema(default: &str) -> ConfigSchema {
    ConfigSchema::new().optional(
        "reason",
        PropertySchema::string("Reason recorded with the status change").with_default(json!(default)),
    )
}

const OPT_IN_REASON: &str = "Opted in via automation";
const OPT_OUT_REASON: &str = "Opted out via automation";

/// Opt the contact in to marketing
#[derive(Debug, Default, Clone, Copy)]
pub struct OptIn;

#[async_trait]
impl Helper for OptIn {
    fn name(&self) -> &str {
        "Opt In"
    }

    fn helper_type(&self) -> &str {
        "opt_in"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Relationship
    }

    fn description(&self) -> &str {
        "Opt the contact in to marketing messages"
    }

    fn config_schema(&self) -> ConfigSchema {
        reason_schema(OPT_IN_REASON)
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        config.str_or("reason", OPT_IN_REASON).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        set_opt_status(ctx, input, true, OPT_IN_REASON).await
    }
}

/// Opt the contact out of marketing
#[derive(Debug, Default, Clone, Copy)]
pub struct OptOut;

#[async_trait]
impl Helper for OptOut {
    fn name(&self) -> &str {
        "Opt Out"
    }

    fn helper_type(&self) -> &str {
        "opt_out"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Relationship
    }

    fn description(&self) -> &str {
        "Opt the contact out of marketing messages"
    }

    fn config_schema(&self) -> ConfigSchema {
        reason_schema(OPT_OUT_REASON)
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        config.str_or("reason", OPT_OUT_REASON).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        set_opt_status(ctx, input, false, OPT_OUT_REASON).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MemoryConnector;
    use crate::helpers::testing::{config, run};
    use sdk::{Capability, CapabilitySet, ConnectorError};
    use std::sync::Arc;

    fn connector(fields: &[(&str, Value)]) -> Arc<MemoryConnector> {
        Arc::new(MemoryConnector::new().with_fields("c-1", fields))
    }

    #[tokio::test]
    async fn test_assign_it_numeric_owner() {
        let crm = connector(&[]);
        let output = run(&AssignIt, &crm, config(&[("owner_id", json!(17))]))
            .await
            .unwrap();

        assert_eq!(output.actions.len(), 1);
        assert_eq!(crm.contact("c-1").unwrap().owner_id.as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn test_assign_it_keeps_existing_owner() {
        let crm = connector(&[("owner_id", json!("5"))]);
        let output = run(
            &AssignIt,
            &crm,
            config(&[("owner_id", json!("9")), ("overwrite", json!(false))]),
        )
        .await
        .unwrap();

        assert!(output.actions.is_empty());
        assert_eq!(crm.field("c-1", "owner_id"), Some(json!("5")));
    }

    #[tokio::test]
    async fn test_company_link_name_is_secondary() {
        let crm = connector(&[]);
        crm.fail_on("set_field", Some("company"), ConnectorError::Platform("read-only".to_string()));
        let output = run(
            &CompanyLink,
            &crm,
            config(&[("company_id", json!("co-9")), ("company_name", json!("Acme"))]),
        )
        .await
        .unwrap();

        assert!(output.success);
        assert_eq!(output.actions.len(), 1);
        assert_eq!(output.logs.len(), 1);
        assert_eq!(crm.field("c-1", "company_id"), Some(json!("co-9")));
    }

    #[tokio::test]
    async fn test_company_link_cancelled_name_write_fails() {
        let crm = connector(&[]);
        crm.fail_on("set_field", Some("company"), ConnectorError::Cancelled);
        let failure = run(
            &CompanyLink,
            &crm,
            config(&[("company_id", json!("co-9")), ("company_name", json!("Acme"))]),
        )
        .await
        .unwrap_err();

        assert!(failure.source.is_interrupt());
        assert!(failure.output.logs.is_empty());
        assert_eq!(failure.output.actions.len(), 1);
    }

    #[tokio::test]
    async fn test_opt_in_and_out() {
        let crm = connector(&[]);
        let output = run(&OptIn, &crm, HelperConfig::new()).await.unwrap();
        assert_eq!(output.actions[0].action_type, ActionType::OptIn);
        assert_eq!(crm.opt_status("c-1"), Some(true));

        let output = run(&OptOut, &crm, config(&[("reason", json!("Unsubscribed"))]))
            .await
            .unwrap();
        assert_eq!(output.actions[0].action_type, ActionType::OptOut);
        assert_eq!(output.actions[0].value, json!("Unsubscribed"));
        assert_eq!(crm.opt_status("c-1"), Some(false));
    }

    #[tokio::test]
    async fn test_opt_in_requires_capability() {
        let crm = Arc::new(
            MemoryConnector::new()
                .with_fields("c-1", &[])
                .with_capabilities(CapabilitySet::all().without(Capability::OptIn)),
        );
        let failure = run(&OptIn, &crm, HelperConfig::new()).await.unwrap_err();
        assert_eq!(failure.output.message, "Failed to opt in contact");
    }
}
