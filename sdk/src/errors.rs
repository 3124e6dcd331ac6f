//! Error types and handling
//!
//! This module provides the error taxonomy shared by connectors, helpers,
//! the registry and the executor. All helper errors implement the
//! `HelperErrorExt` trait which provides user-friendly hints and indicates
//! whether errors are recoverable.
//!
//! # Error Classes
//!
//! - **Configuration**: `validate_config` rejected the helper configuration
//! - **Connector**: a CRM platform call failed (wrapped with operation + target)
//! - **Lookup**: the registry does not know the requested helper type
//! - **Execution**: timeouts, disabled helpers, unsupported platforms

use crate::types::HelperOutput;
use thiserror::Error;

/// Trait for helper error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait HelperErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to whoever is authoring the automation and
    /// never contains credentials or raw platform payloads.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors may succeed when retried by the caller. Non-recoverable
    /// errors require the automation definition or connector setup to change.
    fn is_recoverable(&self) -> bool;
}

/// Errors raised by a `CrmConnector` implementation
///
/// Connectors translate platform-specific failures (HTTP status codes, SDK
/// errors, token refresh problems) into this closed set so helpers never see
/// platform details.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("Operation not supported by this CRM: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl ConnectorError {
    /// Returns true for the two errors produced by the execution context itself
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Main helper error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{HelperError, HelperErrorExt};
///
/// let error = HelperError::Config("source_field is required".to_string());
/// assert_eq!(error.to_string(), "Invalid configuration: source_field is required");
/// assert!(!error.is_recoverable());
///
/// let lookup = HelperError::UnknownHelperType("nonexistent_type".to_string());
/// assert_eq!(lookup.user_hint(), "The automation references a helper that does not exist");
/// ```
#[derive(Debug, Error)]
pub enum HelperError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Platform errors, wrapped with the failing operation and its target
    #[error("{operation} failed for '{target}': {source}")]
    Connector {
        operation: String,
        target: String,
        #[source]
        source: ConnectorError,
    },

    // Data read from the CRM could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    // Registry errors
    #[error("Unknown helper type: {0}")]
    UnknownHelperType(String),

    #[error("Helper type registered twice: {0}")]
    DuplicateHelperType(String),

    // Executor errors
    #[error("Helper '{helper}' does not support CRM platform '{platform}'")]
    UnsupportedPlatform { helper: String, platform: String },

    #[error("Helper is disabled: {0}")]
    HelperDisabled(String),

    #[error("Helper execution timed out after {0}ms")]
    TimedOut(u64),
}

impl HelperError {
    /// Wrap a connector error with the operation and target it was raised for
    pub fn connector(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: ConnectorError,
    ) -> Self {
        Self::Connector {
            operation: operation.into(),
            target: target.into(),
            source,
        }
    }

    /// Build a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether a connector call failed because the execution was cancelled
    /// or ran past its deadline
    ///
    /// Helpers never tolerate these, even in steps that otherwise degrade
    /// gracefully.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Connector { source, .. } if source.is_interrupt())
    }
}

impl HelperErrorExt for HelperError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Fix the helper configuration and save the automation again",
            Self::Connector { source, .. } => match source {
                ConnectorError::Unsupported(_) => "The connected CRM does not support this action",
                ConnectorError::NotFound(_) => "The contact or record no longer exists in the CRM",
                ConnectorError::Authentication(_) => "Reconnect the CRM account",
                ConnectorError::RateLimited => "The CRM is throttling requests. Try again later",
                ConnectorError::Network(_) => "Could not reach the CRM. Check the connection",
                ConnectorError::Platform(_) | ConnectorError::InvalidResponse(_) => {
                    "The CRM rejected the request"
                }
                ConnectorError::Cancelled => "The automation run was cancelled",
                ConnectorError::DeadlineExceeded => "The CRM took too long to respond",
            },
            Self::InvalidData(_) => "The contact data does not have the expected format",
            Self::UnknownHelperType(_) => "The automation references a helper that does not exist",
            Self::DuplicateHelperType(_) => "Two helpers share the same type key",
            Self::UnsupportedPlatform { .. } => "This helper is not available for the connected CRM",
            Self::HelperDisabled(_) => "This helper has been disabled by the administrator",
            Self::TimedOut(_) => "The helper took too long to run. Try again",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Connector { source, .. } => matches!(
                source,
                ConnectorError::RateLimited
                    | ConnectorError::Network(_)
                    | ConnectorError::DeadlineExceeded
                    | ConnectorError::Platform(_)
            ),
            Self::TimedOut(_) => true,

            // Everything else needs a change to the automation or the setup
            _ => false,
        }
    }
}

/// A failed helper execution
///
/// Carries both the error and the output built so far, so callers can persist
/// the output (message, actions performed before the failure, logs) even when
/// the primary effect failed. `output.success` is always false.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ExecutionFailure {
    pub output: HelperOutput,
    #[source]
    pub source: HelperError,
}

impl ExecutionFailure {
    /// Create a failure, forcing the output into its failed state
    pub fn new(mut output: HelperOutput, message: impl Into<String>, source: HelperError) -> Self {
        output.success = false;
        output.message = message.into();
        Self { output, source }
    }
}

impl From<ExecutionFailure> for HelperError {
    fn from(failure: ExecutionFailure) -> Self {
        failure.source
    }
}
