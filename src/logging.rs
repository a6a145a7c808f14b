/// Tracing initialization, called once at the start of `App::new()`.
///
/// Safe to call from multiple `App` instances (e.g. one per tab in tests);
/// later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aerosonix_core=debug,info".into()),
        )
        .try_init();
}
