//! Ingestion routing.
//!
//! Every producer path, network or directory, hands its lines to a `Router`.
//! The router validates a line and puts it on the aggregation queue or on
//! every backend's main queue. It never blocks: a full queue is counted as a
//! drop and the line is gone.

use backend::Backends;
use filter::{FilterError, Validator, Verdict};
use queue::Queue;
use stats::{Field, Stats};
use std::sync::Arc;

/// Shared entry point of the ingestion pipeline. Cheap to clone, one clone
/// per producer thread.
#[derive(Debug, Clone)]
pub struct Router {
    validator: Arc<Validator>,
    aggregation: Queue,
    backends: Arc<Backends>,
    stats: Arc<Stats>,
}

impl Router {
    /// Build a router feeding `aggregation` and the main queues of
    /// `backends`.
    pub fn new(
        validator: Validator,
        aggregation: Queue,
        backends: Arc<Backends>,
        stats: Arc<Stats>,
    ) -> Router {
        Router {
            validator: Arc::new(validator),
            aggregation: aggregation,
            backends: backends,
            stats: stats,
        }
    }

    /// Route a single line, without its line terminator.
    pub fn route(&self, line: &str) {
        match self.validator.process(line) {
            Err(FilterError::Empty) => {
                debug!("dropping empty line");
                self.stats.incr_invalid(1);
            }
            Err(FilterError::Invalid(line)) => {
                info!("dropping invalid metric: {:?}", line);
                self.stats.incr_invalid(1);
            }
            Ok(Verdict::Aggregate(metric)) => match self.aggregation.try_push(metric) {
                Ok(()) => self.stats.incr_all(Field::Aggregated, 1),
                Err(metric) => {
                    warn!("aggregation queue is full, dropping {}", metric);
                    self.stats.incr_all(Field::Dropped, 1);
                }
            },
            Ok(Verdict::Forward(metric)) => {
                self.backends.fan_out(&metric, &self.stats);
            }
        }
    }

    /// Route every line of a batch, in order.
    pub fn route_all<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.route(line.as_ref());
        }
    }

    /// The counters this router reports to.
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use buckets::Prefixes;
    use config::Config;
    use filter::Overwrite;
    use metric::Metric;
    use tempdir::TempDir;

    struct Fixture {
        router: Router,
        aggregation: Queue,
        backends: Arc<Backends>,
        stats: Arc<Stats>,
        _dir: TempDir,
    }

    fn fixture(aggr_capacity: usize, overwrites: Vec<Overwrite>) -> Fixture {
        let dir = TempDir::new("grafsy-router").unwrap();
        let mut config = Config::default();
        config.metrics_per_second = 1;
        config.client_send_interval = 2;
        config.carbon_addrs = vec!["a:2003".to_string(), "b:2003".to_string()];
        config.retry_dir = dir.path().to_path_buf();

        let validator =
            Validator::new(&config.allowed_metrics, Prefixes::default(), overwrites).unwrap();
        let aggregation = Queue::new(aggr_capacity);
        let backends = Arc::new(Backends::new(&config));
        let stats = Arc::new(Stats::new(backends.len()));
        let router = Router::new(
            validator,
            aggregation.clone(),
            Arc::clone(&backends),
            Arc::clone(&stats),
        );
        Fixture {
            router: router,
            aggregation: aggregation,
            backends: backends,
            stats: stats,
            _dir: dir,
        }
    }

    #[test]
    fn plain_metric_reaches_every_backend() {
        let f = fixture(4, Vec::new());
        f.router.route("app.hits 1 1500000000");
        for b in f.backends.iter() {
            assert_eq!(b.main.pop(), Some(Metric::new("app.hits 1 1500000000")));
        }
        assert!(f.aggregation.is_empty());
    }

    #[test]
    fn renamed_metric_reaches_every_backend() {
        let f = fixture(4, vec![Overwrite::new("^legacy\\.", "app.").unwrap()]);
        f.router.route("legacy.hits 1 1500000000");
        for b in f.backends.iter() {
            assert_eq!(b.main.pop(), Some(Metric::new("app.hits 1 1500000000")));
        }
    }

    #[test]
    fn invalid_line_is_counted_and_not_queued() {
        let f = fixture(4, Vec::new());
        f.router.route_all(vec!["not-a-metric", ""]);
        assert_eq!(f.stats.snapshot().server.invalid, 2);
        assert!(f.aggregation.is_empty());
        for b in f.backends.iter() {
            assert!(b.main.is_empty());
        }
    }

    #[test]
    fn prefixed_metric_goes_to_aggregation() {
        let f = fixture(4, Vec::new());
        f.router.route("SUM.app.hits 1 1500000000");
        assert_eq!(f.aggregation.len(), 1);
        let snap = f.stats.snapshot();
        assert_eq!(snap.backends[0].aggregated, 1);
        assert_eq!(snap.backends[1].aggregated, 1);
        for b in f.backends.iter() {
            assert!(b.main.is_empty());
        }
    }

    #[test]
    fn full_aggregation_queue_drops_for_every_backend() {
        let f = fixture(1, Vec::new());
        f.router.route("SUM.app.hits 1 1500000000");
        f.router.route("SUM.app.hits 2 1500000000");
        assert_eq!(f.aggregation.len(), 1);
        let snap = f.stats.snapshot();
        assert_eq!(snap.backends[0].dropped, 1);
        assert_eq!(snap.backends[1].dropped, 1);
        assert_eq!(snap.backends[0].aggregated, 1);
    }

    #[test]
    fn full_main_queue_drops_once() {
        let f = fixture(1, Vec::new());
        let capacity = f.backends.get(0).unwrap().main.capacity();
        for _ in 0..capacity {
            f.router.route("app.hits 1 1500000000");
        }
        f.router.route("app.hits 1 1500000000");
        let snap = f.stats.snapshot();
        assert_eq!(snap.backends[0].dropped, 1);
        assert_eq!(snap.backends[1].dropped, 1);
        assert_eq!(f.backends.get(0).unwrap().main.len(), capacity);
    }
}
