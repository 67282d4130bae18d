//! Library level constants

/// Placeholder replaced by the local hostname in the monitoring path and in
/// every outgoing metric line.
pub const HOSTNAME_PLACEHOLDER: &str = "HOSTNAME";

/// Seconds between two self-monitoring emissions.
pub const MONITORING_INTERVAL: u64 = 60;

/// Number of process wide self-monitoring counters: `got.net`, `got.dir` and
/// `invalid`.
pub const SERVER_STAT_METRICS: usize = 3;

/// Number of self-monitoring counters kept per backend: `sent`, `saved`,
/// `dropped`, `from_retry` and `aggregated`.
pub const BACKEND_STAT_METRICS: usize = 5;

/// The retry file of a backend holds at most this many full main buffers.
pub const RETRY_FILE_BUFFERS: usize = 10;

/// Longest line, terminator included, read off a producer connection. Longer
/// lines are counted invalid and skipped.
pub const MAX_LINE: usize = 64 * 1024;
