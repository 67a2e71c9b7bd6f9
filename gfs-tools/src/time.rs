use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, used for lease expirations and
/// `(client_id, timestamp)` data ids.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

/// Microsecond-resolution timestamp, used as the second half of a
/// `(client_id, timestamp)` push-data key so concurrent pushes from the
/// same client within one second don't collide.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_micros() as u64
}
