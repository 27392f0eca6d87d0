use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, the timestamp unit used throughout the
/// loss/resource tables.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}
