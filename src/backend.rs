//! The table of Carbon collectors grafsy forwards to.
//!
//! A `Backend` bundles everything that belongs to one collector: its main
//! queue, its monitoring queue and its retry file. The table is built once
//! at startup, in configuration order, and shared read-only between workers.
//! The position of a backend in the table is its index into `Stats`.

use config::{Config, Limits};
use metric::Metric;
use queue::Queue;
use retry::RetryFile;
use stats::{Field, Stats};
use std::slice;
use util;

/// One Carbon collector.
#[derive(Debug, Clone)]
pub struct Backend {
    address: String,
    name: String,
    /// Metrics waiting for the next send cycle.
    pub main: Queue,
    /// Self-monitoring lines waiting for the next send cycle.
    pub monitoring: Queue,
    /// Lines that could not be delivered on an earlier cycle.
    pub retry: RetryFile,
}

impl Backend {
    /// Build a backend for `address` with queues and retry file sized by
    /// `limits`.
    pub fn new(address: &str, limits: &Limits, config: &Config) -> Backend {
        Backend {
            address: address.to_string(),
            name: util::sanitize(address),
            main: Queue::new(limits.main_queue_capacity()),
            monitoring: Queue::new(limits.monitoring_queue_capacity()),
            retry: RetryFile::new(&config.retry_dir, address, limits.file_metric_size),
        }
    }

    /// The collector address, `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The address made safe for file names and metric paths.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The static backend table.
#[derive(Debug, Clone)]
pub struct Backends {
    backends: Vec<Backend>,
}

impl Backends {
    /// One backend per configured collector, in configuration order.
    pub fn new(config: &Config) -> Backends {
        let limits = config.limits();
        Backends {
            backends: config
                .carbon_addrs
                .iter()
                .map(|addr| Backend::new(addr, &limits, config))
                .collect(),
        }
    }

    /// Number of backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// The backend at `idx`.
    pub fn get(&self, idx: usize) -> Option<&Backend> {
        self.backends.get(idx)
    }

    /// Iterate backends in configuration order.
    pub fn iter(&self) -> slice::Iter<Backend> {
        self.backends.iter()
    }

    /// Offer `metric` to every backend's main queue. A backend whose queue is
    /// full counts the metric as dropped. Returns the number of backends that
    /// accepted it.
    pub fn fan_out(&self, metric: &Metric, stats: &Stats) -> usize {
        self.offer(metric, stats, |b| &b.main)
    }

    /// Offer `metric` to every backend's monitoring queue. A backend whose
    /// queue is full counts the metric as dropped.
    pub fn fan_out_monitoring(&self, metric: &Metric, stats: &Stats) -> usize {
        self.offer(metric, stats, |b| &b.monitoring)
    }

    fn offer<F>(&self, metric: &Metric, stats: &Stats, queue: F) -> usize
    where
        F: Fn(&Backend) -> &Queue,
    {
        let mut accepted = 0;
        for (idx, backend) in self.backends.iter().enumerate() {
            match queue(backend).try_push(metric.clone()) {
                Ok(()) => accepted += 1,
                Err(m) => {
                    debug!("queue of {} is full, dropping {}", backend.address, m);
                    stats.incr(idx, Field::Dropped, 1);
                }
            }
        }
        accepted
    }
}

impl<'a> IntoIterator for &'a Backends {
    type Item = &'a Backend;
    type IntoIter = slice::Iter<'a, Backend>;

    fn into_iter(self) -> Self::IntoIter {
        self.backends.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.metrics_per_second = 1;
        config.client_send_interval = 2;
        config.carbon_addrs = vec!["a:2003".to_string(), "b:2003".to_string()];
        config.retry_dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn table_follows_configuration() {
        let dir = TempDir::new("grafsy-backend").unwrap();
        let backends = Backends::new(&config(&dir));
        assert_eq!(backends.len(), 2);
        let b = backends.get(1).unwrap();
        assert_eq!(b.address(), "b:2003");
        assert_eq!(b.name(), "b_2003");
        // 2 per cycle plus 3 + 2 * 5 monitoring lines
        assert_eq!(b.main.capacity(), 15);
        assert_eq!(b.monitoring.capacity(), 13);
        assert_eq!(b.retry.capacity(), 20);
        assert_eq!(b.retry.path(), dir.path().join("b_2003").as_path());
    }

    #[test]
    fn full_queue_counts_one_drop() {
        let dir = TempDir::new("grafsy-backend").unwrap();
        let backends = Backends::new(&config(&dir));
        let stats = Stats::new(2);
        let full = backends.get(0).unwrap();
        while full.main.try_push(Metric::new("fill 1 1500000000")).is_ok() {}
        let capacity = full.main.len();

        let accepted = backends.fan_out(&Metric::new("x 1 1500000000"), &stats);
        assert_eq!(accepted, 1);
        assert_eq!(full.main.len(), capacity);
        let snap = stats.snapshot();
        assert_eq!(snap.backends[0].dropped, 1);
        assert_eq!(snap.backends[1].dropped, 0);
        assert_eq!(backends.get(1).unwrap().main.len(), 1);
    }
}
