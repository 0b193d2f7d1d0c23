//! OpenTelemetry wiring, enabled with the `telemetry` feature and only
//! active once `OTEL_EXPORTER_OTLP_*` environment variables are present.
//! Without either, `swapd` falls back to plain stdout logging via
//! `tracing_subscriber::fmt`.

#[cfg(feature = "telemetry")]
mod otel {
    use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
    use opentelemetry_sdk::{
        Resource,
        metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
        trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    };
    use opentelemetry_semantic_conventions::{
        SCHEMA_URL,
        attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
    };
    use std::env;
    use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TelemetryProtocol {
        Http,
        Grpc,
    }

    impl TelemetryProtocol {
        fn from_env() -> Option<Self> {
            let is_enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
                || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
                || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
            if !is_enabled {
                return None;
            }
            let protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
                Ok("grpc") => TelemetryProtocol::Grpc,
                _ => TelemetryProtocol::Http,
            };
            Some(protocol)
        }
    }

    fn resource() -> Resource {
        let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(env!("CARGO_PKG_NAME"))
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    fn init_meter_provider(protocol: TelemetryProtocol) -> SdkMeterProvider {
        let exporter = opentelemetry_otlp::MetricExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::Http => exporter
                .with_http()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build(),
            TelemetryProtocol::Grpc => exporter
                .with_tonic()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build(),
        };
        let exporter = exporter.expect("failed to build OTLP metric exporter");
        let reader = PeriodicReader::builder(exporter).with_interval(std::time::Duration::from_secs(30)).build();
        let meter_provider = MeterProviderBuilder::default().with_resource(resource()).with_reader(reader).build();
        global::set_meter_provider(meter_provider.clone());
        meter_provider
    }

    fn init_tracer_provider(protocol: TelemetryProtocol) -> SdkTracerProvider {
        let exporter = opentelemetry_otlp::SpanExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::Http => exporter.with_http().build(),
            TelemetryProtocol::Grpc => exporter.with_tonic().build(),
        };
        let exporter = exporter.expect("failed to build OTLP span exporter");
        SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(1.0))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource())
            .with_batch_exporter(exporter)
            .build()
    }

    /// Holds the provider handles so shutdown can flush them on drop.
    pub struct Telemetry {
        tracer_provider: Option<SdkTracerProvider>,
        meter_provider: Option<SdkMeterProvider>,
    }

    impl Telemetry {
        pub fn new() -> Self {
            match TelemetryProtocol::from_env() {
                Some(protocol) => {
                    let tracer_provider = init_tracer_provider(protocol);
                    let meter_provider = init_meter_provider(protocol);
                    let tracer = tracer_provider.tracer("swapd");
                    tracing_subscriber::registry()
                        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
                        .with(tracing_subscriber::fmt::layer())
                        .with(MetricsLayer::new(meter_provider.clone()))
                        .with(OpenTelemetryLayer::new(tracer))
                        .init();
                    tracing::info!(?protocol, "OpenTelemetry export enabled");
                    Self {
                        tracer_provider: Some(tracer_provider),
                        meter_provider: Some(meter_provider),
                    }
                }
                None => {
                    tracing_subscriber::registry()
                        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
                        .with(tracing_subscriber::fmt::layer())
                        .init();
                    Self {
                        tracer_provider: None,
                        meter_provider: None,
                    }
                }
            }
        }
    }

    impl Default for Telemetry {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for Telemetry {
        fn drop(&mut self) {
            if let Some(p) = self.tracer_provider.as_ref() {
                if let Err(err) = p.shutdown() {
                    eprintln!("{err:?}");
                }
            }
            if let Some(p) = self.meter_provider.as_ref() {
                if let Err(err) = p.shutdown() {
                    eprintln!("{err:?}");
                }
            }
        }
    }
}

#[cfg(feature = "telemetry")]
pub use otel::Telemetry;

/// Plain stdout logging, used when the `telemetry` feature is compiled out.
#[cfg(not(feature = "telemetry"))]
pub struct Telemetry;

#[cfg(not(feature = "telemetry"))]
impl Telemetry {
    pub fn new() -> Self {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .init();
        Self
    }
}

#[cfg(not(feature = "telemetry"))]
impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
