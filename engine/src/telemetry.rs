//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging. Every helper run is
//! wrapped in an `execution` span carrying the execution id, helper type,
//! contact and account, so all log lines of one run (including connector
//! warnings) can be correlated with its `ExecutionRecord`.
//!
//! Logs go to stderr so that `--json` command output on stdout stays
//! machine-readable.

use tracing::{info_span, Span};
use tracing_subscriber::{fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for the given level
///
/// The HTTP stack behind the REST connector is capped at `warn`, its
/// per-request chatter drowns out the execution logs.
pub fn default_filter(log_level: &str) -> String {
    format!(
        "{l},crmflow_engine={l},hyper=warn,reqwest=warn",
        l = log_level
    )
}

/// Span for one helper execution
pub fn execution_span(id: &str, helper_type: &str, contact_id: &str, account_id: &str) -> Span {
    info_span!(
        "execution",
        execution_id = %id,
        helper = %helper_type,
        contact = %contact_id,
        account = %account_id,
    )
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter.
///
/// Debug builds print pretty output and a line with the timing of each
/// closed execution span. Release builds emit JSON with the current
/// execution span attached to every event.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    let layer = fmt::layer()
        .pretty()
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    #[cfg(not(debug_assertions))]
    let layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .ok();
}

/// Initialize the tracing subscriber at "info" unless `RUST_LOG` says otherwise
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_http_stack() {
        let filter = default_filter("debug");
        assert_eq!(filter, "debug,crmflow_engine=debug,hyper=warn,reqwest=warn");
        assert!(EnvFilter::try_new(filter).is_ok());
    }

    #[test]
    fn test_execution_span_carries_ids() {
        let subscriber = tracing_subscriber::registry();
        tracing::subscriber::with_default(subscriber, || {
            let span = execution_span("exec-1", "copy_it", "c-1", "acct-1");
            let metadata = span.metadata().unwrap();
            assert_eq!(metadata.name(), "execution");
            for field in ["execution_id", "helper", "contact", "account"] {
                assert!(metadata.fields().field(field).is_some(), "{}", field);
            }
        });
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_telemetry();
        init_telemetry_with_level("warn");
    }
}
