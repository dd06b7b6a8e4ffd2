use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the tracing subscriber for a service binary.
///
/// `RUST_LOG` overrides the default directive when set.
pub fn init_tracing(default_directives: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_directives.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
