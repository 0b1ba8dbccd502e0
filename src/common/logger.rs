use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

pub fn init(config: Option<&LoggingConfig>) {
    // Determine the base log level
    let log_level = config
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    // Get any additional filters
    let filters = config
        .and_then(|l| l.filters.as_deref())
        .unwrap_or("");

    // Construct the filter string
    let filter_str = if filters.is_empty() {
        log_level.to_string()
    } else {
        format!("{},{}", log_level, filters)
    };

    // Create the environment filter, allowing RUST_LOG to override
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_file(false)
        .init();
}
