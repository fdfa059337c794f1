use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging.
/// `RUST_LOG` wins when set; otherwise `default_directive` applies.
pub fn init_tracing(json: bool, default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}
