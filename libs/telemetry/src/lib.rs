//! Tracing and OpenTelemetry setup shared by proactive bot services.
//!
//! Logs go to stdout through `tracing-subscriber` (JSON unless `LOG_FORMAT` asks for text),
//! filtered by `RUST_LOG`. With `ENABLE_OTEL` and an OTLP endpoint, turn and trigger spans and
//! metrics are exported too; [`shutdown_telemetry`] flushes them before the process exits.

use anyhow::Result;

mod config;
mod tracing_init;

pub use config::{OtlpTarget, TelemetryConfig, TelemetryProtocol};
pub use tracing_init::{init_telemetry, record_turn_fields, shutdown_telemetry};

/// Installs the subscriber configured from the process environment.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}
