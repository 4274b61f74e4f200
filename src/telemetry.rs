//! Logging and trace context.
//!
//! Logs go to stderr through `tracing-subscriber`, filtered by `RUST_LOG`
//! (default: this crate at `info`). Spans are also fed to an OpenTelemetry
//! tracer so every published message carries a W3C `traceparent` that the
//! backend can correlate.

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Keep the returned provider alive for the
/// life of the process.
pub fn init() -> TracerProvider {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let provider = TracerProvider::builder().build();
    let tracer = provider.tracer(env!("CARGO_PKG_NAME"));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
        format!("{app_name}=info").into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();

    provider
}
