use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialise structured logging
///
/// JSON lines on stdout, level controlled by `RUST_LOG` (default `info`).
/// Records emitted through the `log` facade are forwarded as well.
pub fn init_telemetry() {
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(formatting_layer)
        .init();
}

/// Same as `init_telemetry` but tolerates an already installed subscriber,
/// for test binaries that spawn several servers
pub fn try_init_test_telemetry() {
    if std::env::var("TEST_LOG").is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
