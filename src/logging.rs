use env_logger::Env;

const DEFAULT_FILTER: &str = "info";

/// Installs the process-wide logger. `RUST_LOG` overrides the default filter.
/// Repeated calls are ignored.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

pub fn init_with_filter(default_filter: &str) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}
