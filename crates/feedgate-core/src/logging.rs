use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber, writing to stderr.
///
/// The filter comes from `FEEDGATE_LOG`, then `RUST_LOG`, then `default_filter`.
/// Returns false when a subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = resolve_filter(
        std::env::var("FEEDGATE_LOG").ok(),
        std::env::var("RUST_LOG").ok(),
        default_filter,
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .is_ok()
}

fn resolve_filter(primary: Option<String>, fallback: Option<String>, default_filter: &str) -> EnvFilter {
    [primary, fallback]
        .into_iter()
        .flatten()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter))
}
