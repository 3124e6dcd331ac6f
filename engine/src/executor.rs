//! Helper executor
//!
//! Resolves a helper type through the registry, rejects configurations and
//! platforms it cannot run against, then executes it for one contact under a
//! deadline. Every run that reaches `execute` produces an `ExecutionRecord`.
//!
//! Preflight rejections (unknown or disabled type, unsupported platform, bad
//! configuration) and timeouts are returned as `HelperError`; nothing was
//! written to the CRM in those cases that the caller could persist. A helper
//! that fails its primary step still yields a record, whose output carries the
//! actions performed before the failure.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sdk::{
    CrmConnector, ExecContext, Helper, HelperConfig, HelperError, HelperErrorExt, HelperInput,
    HelperOutput,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::registry::HelperRegistry;
use crate::telemetry::execution_span;

/// One helper invocation to run
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub helper_type: String,
    pub contact_id: String,
    pub user_id: String,
    pub account_id: String,
    pub helper_id: String,
    pub config: HelperConfig,
}

impl ExecutionRequest {
    pub fn new(
        helper_type: impl Into<String>,
        contact_id: impl Into<String>,
        config: HelperConfig,
    ) -> Self {
        Self {
            helper_type: helper_type.into(),
            contact_id: contact_id.into(),
            user_id: String::new(),
            account_id: String::new(),
            helper_id: String::new(),
            config,
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

/// Error attached to a failed execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    pub message: String,
    pub hint: String,
    pub recoverable: bool,
}

impl From<&HelperError> for RecordedError {
    fn from(error: &HelperError) -> Self {
        Self {
            message: error.to_string(),
            hint: error.user_hint().to_string(),
            recoverable: error.is_recoverable(),
        }
    }
}

/// Audit record of one helper execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub helper_type: String,
    pub contact_id: String,
    pub account_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub output: HelperOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
}

impl ExecutionRecord {
    pub fn succeeded(&self) -> bool {
        self.output.success && self.error.is_none()
    }
}

/// Runs helpers from a registry
pub struct HelperExecutor<'r> {
    registry: &'r HelperRegistry,
    timeout: Duration,
    disabled: HashSet<String>,
}

impl<'r> HelperExecutor<'r> {
    pub fn new(registry: &'r HelperRegistry, settings: &ExecutionConfig) -> Self {
        Self {
            registry,
            timeout: settings.timeout(),
            disabled: settings.disabled_helpers.iter().cloned().collect(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check a request without running it
    ///
    /// Performs every preflight step of `execute` and never touches the
    /// connector beyond reading its platform slug.
    pub fn preflight(
        &self,
        request: &ExecutionRequest,
        connector: &dyn CrmConnector,
    ) -> Result<Box<dyn Helper>, HelperError> {
        let helper = self.registry.new_helper(&request.helper_type)?;
        if self.disabled.contains(&request.helper_type) {
            return Err(HelperError::HelperDisabled(request.helper_type.clone()));
        }
        let platform = connector.info().slug;
        if !helper.info().supports_platform(&platform) {
            return Err(HelperError::UnsupportedPlatform {
                helper: request.helper_type.clone(),
                platform,
            });
        }
        helper.validate_config(&request.config)?;
        Ok(helper)
    }

    /// Run one helper invocation
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        connector: Arc<dyn CrmConnector>,
    ) -> Result<ExecutionRecord, HelperError> {
        let helper = match self.preflight(&request, connector.as_ref()) {
            Ok(helper) => helper,
            Err(e) => {
                warn!(
                    "Rejected {} for contact {}: {}",
                    request.helper_type, request.contact_id, e
                );
                return Err(e);
            }
        };

        let id = Uuid::new_v4().to_string();
        let span = execution_span(
            &id,
            &request.helper_type,
            &request.contact_id,
            &request.account_id,
        );
        self.run(helper, id, request, connector).instrument(span).await
    }

    async fn run(
        &self,
        helper: Box<dyn Helper>,
        id: String,
        request: ExecutionRequest,
        connector: Arc<dyn CrmConnector>,
    ) -> Result<ExecutionRecord, HelperError> {
        let input = HelperInput::new(request.contact_id.clone(), request.config, connector)
            .with_user(request.user_id)
            .with_account(request.account_id.clone())
            .with_helper_id(request.helper_id);
        let ctx = ExecContext::with_timeout(self.timeout);

        debug!("Running {}", request.helper_type);
        let started_at = Utc::now();
        let start = Instant::now();

        let result = match timeout(self.timeout, helper.execute(&ctx, &input)).await {
            Ok(result) => result,
            Err(_) => {
                ctx.cancel();
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!("{} timed out after {}ms", request.helper_type, timeout_ms);
                return Err(HelperError::TimedOut(timeout_ms));
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (output, error) = match result {
            Ok(output) => (output, None),
            Err(failure) => {
                let recorded = RecordedError::from(&failure.source);
                (failure.output, Some(recorded))
            }
        };

        let record = ExecutionRecord {
            id,
            helper_type: request.helper_type,
            contact_id: request.contact_id,
            account_id: request.account_id,
            started_at,
            duration_ms,
            output,
            error,
        };

        match &record.error {
            None => info!(
                "{} succeeded in {}ms with {} action(s): {}",
                record.helper_type,
                record.duration_ms,
                record.output.actions.len(),
                record.output.message
            ),
            Some(error) => warn!(
                "{} failed in {}ms: {} ({})",
                record.helper_type, record.duration_ms, record.output.message, error.message
            ),
        }

        Ok(record)
    }

    /// Run many invocations against one connector, at most `concurrency` at a time
    ///
    /// Results come back in request order.
    pub async fn execute_all(
        &self,
        requests: Vec<ExecutionRequest>,
        connector: Arc<dyn CrmConnector>,
        concurrency: usize,
    ) -> Vec<Result<ExecutionRecord, HelperError>> {
        stream::iter(requests)
            .map(|request| self.execute(request, Arc::clone(&connector)))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}
