//! Wall-clock helpers.

use chrono::Utc;
use std::thread;
use std::time::Duration;

/// Current unix time in seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Sleep the calling thread for `secs` seconds.
#[inline]
pub fn sleep_secs(secs: u64) {
    thread::sleep(Duration::from_secs(secs));
}
