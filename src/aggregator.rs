//! Windowed aggregation of prefixed metrics.
//!
//! The `Router` puts every metric whose name starts with an aggregation
//! prefix onto the aggregation queue. Once per window the `Aggregator` drains
//! what is queued, folds it into `Buckets` and offers one line per bucket to
//! every backend. Nothing survives from one window to the next.

use backend::Backends;
use buckets::{Buckets, Prefixes};
use protocols::graphite;
use queue::Queue;
use source::Source;
use stats::Stats;
use std::sync::Arc;
use time;

/// The aggregation worker.
pub struct Aggregator {
    queue: Queue,
    prefixes: Prefixes,
    interval: u64,
    backends: Arc<Backends>,
    stats: Arc<Stats>,
}

impl Aggregator {
    /// Aggregate what arrives on `queue` every `interval` seconds.
    pub fn new(
        queue: Queue,
        prefixes: Prefixes,
        interval: u64,
        backends: Arc<Backends>,
        stats: Arc<Stats>,
    ) -> Aggregator {
        Aggregator {
            queue: queue,
            prefixes: prefixes,
            interval: interval,
            backends: backends,
            stats: stats,
        }
    }

    /// Close one window at `timestamp`. Returns the number of lines emitted.
    ///
    /// Only the items queued when the drain starts are consumed. Lines whose
    /// value does not parse are logged and skipped.
    pub fn aggregate(&self, timestamp: i64) -> usize {
        let mut buckets = Buckets::default();
        for metric in self.queue.take(self.queue.len()) {
            let (name, value) = match graphite::parse_graphite(metric.as_str()) {
                Some((name, value, _)) => (name, value),
                None => {
                    warn!("unable to parse value of {}", metric);
                    continue;
                }
            };
            match self.prefixes.split(name) {
                Some((kind, bare)) => buckets.add(kind, bare, value),
                None => debug!("no aggregation prefix on {}", metric),
            }
        }

        let closed = buckets.close(timestamp);
        let emitted = closed.len();
        for metric in closed {
            if self.backends.fan_out(&metric, &self.stats) < self.backends.len() {
                warn!("main queue is full, dropping aggregated {}", metric);
            }
        }
        emitted
    }
}

impl Source for Aggregator {
    fn run(&mut self) {
        loop {
            time::sleep_secs(self.interval);
            self.aggregate(time::now());
        }
    }
}
