use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{HasExportConfig, MetricExporter, SpanExporter};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    trace::SdkTracerProvider,
};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{OtlpTarget, TelemetryConfig, TelemetryProtocol};

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(15);

/// Providers behind the OTLP layer; `None` once installed without a collector.
static PIPELINE: OnceLock<Option<OtlpPipeline>> = OnceLock::new();

struct OtlpPipeline {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
}

impl OtlpPipeline {
    fn start(cfg: &TelemetryConfig, target: &OtlpTarget) -> Result<Self> {
        let resource = Resource::builder_empty()
            .with_service_name(cfg.service_name.clone())
            .with_attributes([
                KeyValue::new("service.version", cfg.service_version.clone()),
                KeyValue::new("deployment.environment", cfg.environment.clone()),
            ])
            .build();

        let spans = match target.protocol {
            TelemetryProtocol::Grpc => aimed(SpanExporter::builder().with_tonic(), target).build(),
            TelemetryProtocol::HttpProtobuf => {
                aimed(SpanExporter::builder().with_http(), target).build()
            }
        }
        .context("failed to build OTLP span exporter")?;
        let metrics = match target.protocol {
            TelemetryProtocol::Grpc => {
                aimed(MetricExporter::builder().with_tonic(), target).build()
            }
            TelemetryProtocol::HttpProtobuf => {
                aimed(MetricExporter::builder().with_http(), target).build()
            }
        }
        .context("failed to build OTLP metric exporter")?;

        let tracer = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(spans)
            .build();
        let meter = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(
                PeriodicReader::builder(metrics)
                    .with_interval(METRIC_EXPORT_INTERVAL)
                    .build(),
            )
            .build();
        global::set_tracer_provider(tracer.clone());
        global::set_meter_provider(meter.clone());
        Ok(Self { tracer, meter })
    }
}

fn aimed<B: HasExportConfig>(mut builder: B, target: &OtlpTarget) -> B {
    builder.export_config().endpoint = Some(target.endpoint.clone());
    builder
}

/// Installs the global subscriber: an env filter, JSON or text logs on stdout, and an
/// OpenTelemetry layer when a collector is configured. Later calls are no-ops.
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<()> {
    if PIPELINE.get().is_some() {
        return Ok(());
    }

    let pipeline = cfg
        .otlp
        .as_ref()
        .map(|target| OtlpPipeline::start(&cfg, target))
        .transpose()?;

    let filter = EnvFilter::try_new(&cfg.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let logs = if cfg.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    let otel = pipeline
        .as_ref()
        .map(|pipeline| OpenTelemetryLayer::new(pipeline.tracer.tracer(cfg.service_name.clone())));

    tracing_subscriber::registry()
        .with(filter)
        .with(logs)
        .with(otel)
        .try_init()
        .ok();

    PIPELINE.set(pipeline).ok();
    Ok(())
}

/// Flushes pending spans and metrics. Call once the server has drained.
pub fn shutdown_telemetry() {
    let Some(Some(pipeline)) = PIPELINE.get() else {
        return;
    };
    if let Err(err) = pipeline.tracer.shutdown() {
        eprintln!("failed to flush spans: {err}");
    }
    if let Err(err) = pipeline.meter.shutdown() {
        eprintln!("failed to flush metrics: {err}");
    }
}

/// Records the conversation coordinates on a span declared with matching empty fields.
pub fn record_turn_fields(
    span: &Span,
    channel_id: &str,
    conversation_id: &str,
    activity_id: Option<&str>,
) {
    span.record("channel_id", tracing::field::display(channel_id));
    span.record("conversation_id", tracing::field::display(conversation_id));
    if let Some(activity_id) = activity_id {
        span.record("activity_id", tracing::field::display(activity_id));
    }
}
