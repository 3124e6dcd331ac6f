//! Crmflow SDK
//!
//! Shared contracts for CRM automation helpers: the connector capability
//! surface, the helper trait, the execution input/output envelope and the
//! error taxonomy. This crate is used by the engine and by anything that
//! implements a connector or a helper outside of it.

/// Execution context (cancellation and deadlines)
pub mod context;

/// CRM connector trait and contact types
pub mod connector;

/// Error types and handling
pub mod errors;

/// Helper trait, metadata and configuration schema
pub mod helper;

/// Helper input/output types
pub mod types;

// Re-export commonly used types
pub use connector::{
    Capability, CapabilitySet, ConnectorInfo, Contact, ContactPage, ContactQuery, CrmConnector,
    CustomField, FieldMap, NewContact, Tag,
};
pub use context::ExecContext;
pub use errors::{ConnectorError, ExecutionFailure, HelperError, HelperErrorExt};
pub use helper::{ConfigSchema, Helper, HelperCategory, HelperInfo, PropertySchema};
pub use types::{ActionType, HelperAction, HelperConfig, HelperInput, HelperOutput};
