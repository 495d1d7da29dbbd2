use chrono::Utc;

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
