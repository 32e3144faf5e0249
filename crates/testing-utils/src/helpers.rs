//! Test helper utilities

use chrono::{DateTime, Duration, Utc};

/// Set up logging for tests (safe to call from every test)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// Get a timestamp offset from now
pub fn timestamp_with_offset(offset_seconds: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(offset_seconds)
}
