use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Orbit, Request, Response, Rocket,
    fairing::{Fairing, Info, Kind},
};
use std::sync::Mutex;
use std::time::Instant;
use tonic::metadata::{MetadataMap, MetadataValue};
use tracing::info_span;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const HONEYCOMB_ENDPOINT: &str = "https://api.honeycomb.io:443";

pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "OpenTelemetry",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let uri = request.uri().to_string();

        let start_time = Instant::now();

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, uri),
            http.method = method,
            http.uri = uri,
            http.status_code = tracing::field::Empty,
            http.duration_ms = tracing::field::Empty,
        );

        request.local_cache(|| (span, start_time));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let (span, start_time) = request.local_cache(|| {
            let span = info_span!("http_request");
            (span, Instant::now())
        });

        let duration = start_time.elapsed();
        let duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);

        span.record("http.status_code", response.status().code);
        span.record("http.duration_ms", duration_ms);

        span.in_scope(|| {
            tracing::info!(
                "Completed request in {}ms with status {}",
                duration_ms,
                response.status().code
            );
        });
    }
}

fn resource() -> Resource {
    let environment = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_tracer_provider(api_key: &str) -> Result<SdkTracerProvider, String> {
    let mut metadata = MetadataMap::new();
    let key = MetadataValue::try_from(api_key).map_err(|e| format!("Invalid API key: {}", e))?;
    metadata.insert("x-honeycomb-team", key);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(HONEYCOMB_ENDPOINT)
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata)
        .build()
        .map_err(|e| format!("Failed to build span exporter: {}", e))?;

    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build())
}

pub struct OtelGuard {
    tracer_provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            tracing::error!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}

/// Installs the global subscriber: env filter (default `info`) and a fmt
/// layer, plus OTLP export to Honeycomb when `HONEYCOMB_API_KEY` is set.
pub fn init_tracing() -> Option<OtelGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let api_key = dotenvy::var("HONEYCOMB_API_KEY")
        .ok()
        .filter(|key| !key.is_empty());

    let provider = match api_key.as_deref().map(init_tracer_provider) {
        Some(Ok(provider)) => Some(provider),
        Some(Err(err)) => {
            eprintln!("Telemetry export disabled: {}", err);
            None
        }
        None => None,
    };

    let otel_layer = provider
        .as_ref()
        .map(|provider| OpenTelemetryLayer::new(provider.tracer("study-tracker")));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer);

    if registry.try_init().is_err() {
        return None;
    }

    provider.map(|tracer_provider| OtelGuard { tracer_provider })
}

/// Flushes the exporter when Rocket shuts down.
pub struct TelemetryShutdown {
    guard: Mutex<Option<OtelGuard>>,
}

impl TelemetryShutdown {
    pub fn new(guard: Option<OtelGuard>) -> Self {
        Self {
            guard: Mutex::new(guard),
        }
    }
}

#[rocket::async_trait]
impl Fairing for TelemetryShutdown {
    fn info(&self) -> Info {
        Info {
            name: "Telemetry shutdown",
            kind: Kind::Shutdown,
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        let guard = match self.guard.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if guard.is_some() {
            tracing::info!("Shutting down telemetry");
        }
        drop(guard);
    }
}
