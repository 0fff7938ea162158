use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;

pub fn now_timestamp_string() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

/// `RUST_LOG` wins over `log_level` when it is set.
pub fn init_tracing(log_level: &str) {
    let normalized = log_level
        .split_whitespace()
        .next()
        .unwrap_or("info")
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(normalized));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
