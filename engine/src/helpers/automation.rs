//! Goal and automation trigger helpers

use async_trait::async_trait;
use sdk::{
    ActionType, ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig,
    HelperError, HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};

use crate::helpers::{achieve_goal, invalid_config, PrimaryStep, DEFAULT_INTEGRATION};

/// Fire a goal for the contact
#[derive(Debug, Default, Clone, Copy)]
pub struct GoalIt;

#[async_trait]
impl Helper for GoalIt {
    fn name(&self) -> &str {
        "Goal It"
    }

    fn helper_type(&self) -> &str {
        "goal_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Automation
    }

    fn description(&self) -> &str {
        "Achieve a named goal for the contact"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("goal", PropertySchema::string("Goal name"))
            .optional(
                "integration",
                PropertySchema::string("Integration namespace").with_default(json!(DEFAULT_INTEGRATION)),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        config.require_str("goal")?;
        config.str_or("integration", DEFAULT_INTEGRATION)?;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let goal = input.config.require_str("goal").map_err(invalid_config)?;
        let integration = input
            .config
            .str_or("integration", DEFAULT_INTEGRATION)
            .map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        achieve_goal(ctx, input, &mut output, integration, goal)
            .await
            .primary(&mut output, || format!("Failed to achieve goal '{}'", goal))?;
        Ok(output.succeed(format!("Achieved goal '{}:{}'", integration, goal)))
    }
}

/// Start an automation for the contact
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerIt;

#[async_trait]
impl Helper for TriggerIt {
    fn name(&self) -> &str {
        "Trigger It"
    }

    fn helper_type(&self) -> &str {
        "trigger_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Automation
    }

    fn description(&self) -> &str {
        "Start another automation for the contact"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required(
            "automation_id",
            PropertySchema::string("Automation to start"),
        )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        automation_id(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let automation = automation_id(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        input
            .connector
            .trigger_automation(ctx, &input.contact_id, &automation)
            .await
            .map_err(|e| HelperError::connector("trigger_automation", &automation, e))
            .primary(&mut output, || {
                format!("Failed to trigger automation '{}'", automation)
            })?;
        output.action(
            ActionType::AutomationTriggered,
            automation.clone(),
            Value::Bool(true),
        );
        Ok(output.succeed(format!("Triggered automation '{}'", automation)))
    }
}

/// Automation ids may be configured as numbers or strings
fn automation_id(config: &HelperConfig) -> Result<String, HelperError> {
    match config.get("automation_id") {
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        _ => config.require_str("automation_id").map(|s| s.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::memory::ConnectorEvent;
    use crate::connectors::MemoryConnector;
    use crate::helpers::testing::{config, run};
    use sdk::{Capability, CapabilitySet, ConnectorError, HelperErrorExt};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_goal_it_fires_goal() {
        let crm = Arc::new(MemoryConnector::new().with_fields("c-1", &[]));
        let output = run(&GoalIt, &crm, config(&[("goal", json!("webinar_signup"))]))
            .await
            .unwrap();

        assert_eq!(output.actions[0].action_type, ActionType::GoalAchieved);
        assert_eq!(output.actions[0].target, "crmflow:webinar_signup");
        assert_eq!(crm.events().len(), 1);
    }

    #[tokio::test]
    async fn test_goal_it_failure_is_primary() {
        let crm = Arc::new(MemoryConnector::new().with_fields("c-1", &[]));
        crm.fail_on("achieve_goal", None, ConnectorError::RateLimited);
        let failure = run(&GoalIt, &crm, config(&[("goal", json!("x"))]))
            .await
            .unwrap_err();

        assert!(!failure.output.success);
        assert!(failure.source.is_recoverable());
    }

    #[tokio::test]
    async fn test_trigger_it_numeric_id() {
        let crm = Arc::new(MemoryConnector::new().with_fields("c-1", &[]));
        let output = run(&TriggerIt, &crm, config(&[("automation_id", json!(42))]))
            .await
            .unwrap();

        assert_eq!(output.message, "Triggered automation '42'");
        assert_eq!(
            crm.events(),
            vec![ConnectorEvent::AutomationTriggered {
                contact_id: "c-1".to_string(),
                automation_id: "42".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_trigger_it_unsupported_platform_capability() {
        let crm = Arc::new(
            MemoryConnector::new()
                .with_fields("c-1", &[])
                .with_capabilities(CapabilitySet::all().without(Capability::Automations)),
        );
        let failure = run(&TriggerIt, &crm, config(&[("automation_id", json!("welcome"))]))
            .await
            .unwrap_err();

        assert_eq!(
            failure.source.user_hint(),
            "The connected CRM does not support this action"
        );
    }
}
