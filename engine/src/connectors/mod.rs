//! CRM connector implementations
//!
//! - `memory`: process-local store used by tests and `crmflow run --fixture`
//! - `rest`: generic JSON-over-HTTP bridge to a CRM gateway

pub mod memory;
pub mod rest;

pub use memory::{ConnectorEvent, MemoryConnector, MemoryFixture};
pub use rest::RestConnector;
