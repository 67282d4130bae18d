use backend::Backends;
use constants;
use metric::Metric;
use source::Source;
use stats::{Snapshot, Stats};
use std::sync::Arc;
use time;

/// 'Internal' is a Source which is meant to allow grafsy to self-telemeter.
/// Once a minute every counter is snapshotted and reset, turned into metric
/// lines and offered to each backend's monitoring queue. The lines travel
/// the same way as any other metric from there.
pub struct Internal {
    prefix: String,
    backends: Arc<Backends>,
    stats: Arc<Stats>,
}

impl Internal {
    /// Report under `<prefix>.grafsy`. `prefix` must already have the
    /// hostname substituted.
    pub fn new<S>(prefix: S, backends: Arc<Backends>, stats: Arc<Stats>) -> Internal
    where
        S: Into<String>,
    {
        Internal {
            prefix: prefix.into(),
            backends: backends,
            stats: stats,
        }
    }

    /// Build the report lines for `snap`, stamped with `timestamp`.
    pub fn lines(&self, snap: &Snapshot, timestamp: i64) -> Vec<Metric> {
        let path = format!("{}.grafsy", self.prefix);
        let mut lines = Vec::with_capacity(
            constants::SERVER_STAT_METRICS + constants::BACKEND_STAT_METRICS * snap.backends.len(),
        );
        let line = |name: &str, value: usize| {
            Metric::new(format!("{}.{} {} {}", path, name, value, timestamp))
        };
        lines.push(line("got.net", snap.server.net));
        lines.push(line("got.dir", snap.server.dir));
        lines.push(line("invalid", snap.server.invalid));
        for (backend, stat) in self.backends.iter().zip(&snap.backends) {
            let name = backend.name();
            lines.push(line(&format!("{}.sent", name), stat.sent));
            lines.push(line(&format!("{}.saved", name), stat.saved));
            lines.push(line(&format!("{}.dropped", name), stat.dropped));
            lines.push(line(&format!("{}.from_retry", name), stat.from_retry));
            lines.push(line(&format!("{}.aggregated", name), stat.aggregated));
        }
        lines
    }

    /// Snapshot and reset the counters and queue one report.
    pub fn report(&self, timestamp: i64) {
        let snap = self.stats.snapshot_and_reset();
        for (backend, stat) in self.backends.iter().zip(&snap.backends) {
            if stat.dropped > 0 {
                warn!(
                    "dropped {} metrics for {} in the last {} seconds",
                    stat.dropped,
                    backend.address(),
                    constants::MONITORING_INTERVAL
                );
            }
        }
        for line in self.lines(&snap, timestamp) {
            if self.backends.fan_out_monitoring(&line, &self.stats) < self.backends.len() {
                warn!("monitoring queue is full, dropping {}", line);
            }
        }
    }
}

impl Source for Internal {
    fn run(&mut self) {
        loop {
            time::sleep_secs(constants::MONITORING_INTERVAL);
            self.report(time::now());
        }
    }
}
