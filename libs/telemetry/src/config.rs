use std::env;

const DEFAULT_LOG_FILTER: &str = "info";

/// Wire protocol of the OTLP collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TelemetryProtocol {
    #[default]
    Grpc,
    HttpProtobuf,
}

impl TelemetryProtocol {
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "http" | "http/protobuf" => Self::HttpProtobuf,
            _ => Self::Grpc,
        }
    }
}

/// Collector that receives spans and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpTarget {
    pub endpoint: String,
    pub protocol: TelemetryProtocol,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    /// `RUST_LOG` directives, `info` when unset.
    pub log_filter: String,
    pub json_logs: bool,
    /// Set only when `ENABLE_OTEL` is on and an endpoint is configured.
    pub otlp: Option<OtlpTarget>,
}

impl TelemetryConfig {
    pub fn from_env(service_name: &str, service_version: &str) -> Self {
        Self::from_lookup(service_name, service_version, |name| env::var(name).ok())
    }

    /// Reads `RUST_LOG`, `LOG_FORMAT`, `ENABLE_OTEL`, `OTEL_EXPORTER_OTLP_ENDPOINT`,
    /// `OTEL_EXPORTER_OTLP_PROTOCOL`, `OTEL_SERVICE_NAME` and `DEPLOYMENT_ENV`.
    pub fn from_lookup(
        service_name: &str,
        service_version: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let otel_on = var("ENABLE_OTEL").is_some_and(|flag| {
            matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        });
        let otlp = var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .filter(|_| otel_on)
            .map(|endpoint| OtlpTarget {
                endpoint,
                protocol: var("OTEL_EXPORTER_OTLP_PROTOCOL")
                    .map(|name| TelemetryProtocol::from_name(&name))
                    .unwrap_or_default(),
            });
        let json_logs = !var("LOG_FORMAT").is_some_and(|format| {
            matches!(format.trim().to_ascii_lowercase().as_str(), "text" | "pretty" | "plain")
        });

        Self {
            service_name: var("OTEL_SERVICE_NAME").unwrap_or_else(|| service_name.to_string()),
            service_version: service_version.to_string(),
            environment: var("DEPLOYMENT_ENV").unwrap_or_else(|| "dev".into()),
            log_filter: var("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.into()),
            json_logs,
            otlp,
        }
    }
}
