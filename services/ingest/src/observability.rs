//! Logging, tracing, and metrics bootstrap.
//!
//! Request handling extracts the W3C trace context from incoming headers so
//! ingest spans continue upstream traces; OTLP export is best-effort and the
//! service falls back to local logs when no collector is reachable.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace as sdktrace;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();
static TELEMETRY: OnceLock<()> = OnceLock::new();
static PROPAGATOR: OnceLock<()> = OnceLock::new();

/// Install the tracing subscriber, the trace-context propagator, and the
/// Prometheus recorder. Idempotent so tests can call it freely.
pub fn init_observability(service_name: &str) -> PrometheusHandle {
    TELEMETRY.get_or_init(|| {
        init_propagator();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer());
        match otlp_tracer(service_name) {
            Some(tracer) => {
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                let _ = registry.with(otel_layer).try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    });
    prometheus_handle()
}

// Stand up the OTLP batch pipeline and hand a tracer to the subscriber
// layer. None when no exporter can be installed.
fn otlp_tracer(service_name: &str) -> Option<sdktrace::Tracer> {
    let mut attrs = vec![KeyValue::new("service.name", service_name.to_string())];
    if let Ok(instance) = std::env::var("HIVE_INSTANCE_ID").or_else(|_| std::env::var("HOSTNAME")) {
        attrs.push(KeyValue::new("service.instance.id", instance));
    }
    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(attrs)))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .ok()?;
    Some(provider.tracer(service_name.to_string()))
}

fn init_propagator() {
    PROPAGATOR.get_or_init(|| {
        global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );
    });
}

/// Extract the upstream trace context from request headers; the router uses
/// it as the parent of each `http.request` span.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    init_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

// HeaderMap view for the propagator.
struct HeaderExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Serve the Prometheus scrape endpoint on its own listener.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await
}

fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("install metrics recorder")
        })
        .clone()
}
