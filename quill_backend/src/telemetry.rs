use tracing_subscriber::EnvFilter;

/// Initializes a global tracing subscriber respecting the `RUST_LOG`
/// environment variable. Subsequent calls become no-ops so the server, the
/// terminal client and the integration tests can all invoke it.
pub fn init_tracing() {
    init_tracing_with_default("quill_backend=info,tower_http=info");
}

/// Same as [`init_tracing`] but with a caller-chosen fallback filter.
pub fn init_tracing_with_default(default_filter: &str) {
    let env_filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
