//! Crmflow Engine Library
//!
//! This library provides the helper registry, the built-in helpers, the CRM
//! connectors and the executor. It is used by both the main binary and
//! integration tests.

/// Configuration management module
pub mod config;

/// CRM connector implementations
pub mod connectors;

/// Helper execution with deadlines and audit records
pub mod executor;

/// Built-in helpers
pub mod helpers;

/// Helper type registry
pub mod registry;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
