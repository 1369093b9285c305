//! # Telemetry Features
//!
//! Console logging through `tracing_subscriber::fmt` is always on and is
//! filtered with `RUST_LOG` (default `info`). Two optional features export
//! through OpenTelemetry to stdout on top of it.
//!
//! ## Feature matrix
//!
//! - `otel-trace`: exports spans (the pool's `pool_run` span, worker spans, and
//!   their events).
//! - `otel-metrics`: exports run counters (jobs submitted, succeeded, failed,
//!   abandoned) and a run duration histogram.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run -p batchpool-cli --features otel-trace,otel-metrics -- --fail-first 1
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Metrics-specific imports
#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "otel-trace")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-trace")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel-trace")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Errors are reported on stderr
    /// since the subscriber may already be unusable.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-trace")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "otel-metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-trace")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "otel-metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
    let scope = InstrumentationScope::builder("batchpool")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_writer(std::io::stderr)
                .compact(),
        );

    #[cfg(feature = "otel-trace")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "otel-metrics")]
    {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(&meter);
    }

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-trace")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("batchpool")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otel-metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let exporter = opentelemetry_stdout::MetricExporter::default();
    let reader = sdkmetrics::PeriodicReader::builder(exporter)
        .with_interval(std::time::Duration::from_secs(5))
        .build();

    sdkmetrics::SdkMeterProvider::builder()
        .with_resource(resource())
        .with_reader(reader)
        .build()
}

#[cfg(feature = "otel-trace")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let exporter = opentelemetry_stdout::SpanExporter::default();
    let batch = sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build();

    sdktrace::SdkTracerProvider::builder()
        .with_resource(resource())
        .with_span_processor(batch)
        .build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "otel-metrics")]
static JOBS_SUBMITTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static JOBS_SUCCEEDED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static JOBS_FAILED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static JOBS_ABANDONED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static RUN_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "otel-metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = JOBS_SUBMITTED.set(
        meter
            .u64_counter("jobs_submitted")
            .with_description("Jobs handed to the pool")
            .build(),
    );

    let _ = JOBS_SUCCEEDED.set(
        meter
            .u64_counter("jobs_succeeded")
            .with_description("Jobs whose final attempt succeeded")
            .build(),
    );

    let _ = JOBS_FAILED.set(
        meter
            .u64_counter("jobs_failed")
            .with_description("Jobs that exhausted every attempt")
            .build(),
    );

    let _ = JOBS_ABANDONED.set(
        meter
            .u64_counter("jobs_abandoned")
            .with_description("Jobs dropped by cancellation without a result")
            .build(),
    );

    let _ = RUN_DURATION_MS.set(
        meter
            .f64_histogram("run_duration")
            .with_unit("ms")
            .with_description("End-to-end pool run duration")
            .build(),
    );
}

/// Outcome counts of one run, recorded in a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub abandoned: u64,
}

// Compiles to a no-op when metrics are disabled
#[cfg(feature = "otel-metrics")]
pub fn record_run(counts: RunCounts, duration_ms: f64) {
    let pairs = [
        (&JOBS_SUBMITTED, counts.submitted),
        (&JOBS_SUCCEEDED, counts.succeeded),
        (&JOBS_FAILED, counts.failed),
        (&JOBS_ABANDONED, counts.abandoned),
    ];
    for (handle, value) in pairs {
        if let Some(counter) = handle.get() {
            counter.add(value, &[]);
        }
    }
    if let Some(histogram) = RUN_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_run(_counts: RunCounts, _duration_ms: f64) {}
