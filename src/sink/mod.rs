//! Consumers of metric lines.

use time;

mod carbon;

pub use self::carbon::{Carbon, CarbonConfig};

/// A 'sink' is a sink for metrics.
///
/// Sinks are driven by their own timer: every `flush_interval` seconds they
/// pull what is waiting for them and ship it.
pub trait Sink {
    /// Ship everything currently waiting. Must not block longer than one
    /// flush interval.
    fn flush(&mut self) -> ();
    /// Seconds between two flushes.
    fn flush_interval(&self) -> u64;
    /// Flush forever.
    fn run(&mut self) {
        loop {
            self.flush();
            time::sleep_secs(self.flush_interval());
        }
    }
}
