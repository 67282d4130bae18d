//! Forward metrics to a Carbon collector over plaintext TCP.

use backend::Backend;
use config::Config;
use constants;
use metric::Metric;
use sink::Sink;
use stats::{Field, Stats};
use std::io::Write;
use std::iter;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use supervisor::Supervisor;

/// Configuration for the `Carbon` sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarbonConfig {
    /// Seconds allowed for connecting.
    pub connect_timeout: u64,
    /// Seconds all writes of one cycle may take once connected.
    pub write_timeout: u64,
    /// Seconds between two send cycles.
    pub flush_interval: u64,
    /// Sends allowed per cycle for retry plus main lines. Self-monitoring
    /// lines are not limited.
    pub main_buffer_size: usize,
    /// Substituted for `HOSTNAME` in every outgoing line.
    pub hostname: String,
    /// Heartbeat target, notified once per cycle.
    pub supervisor: Supervisor,
}

impl<'a> From<&'a Config> for CarbonConfig {
    fn from(config: &'a Config) -> CarbonConfig {
        CarbonConfig {
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout(),
            flush_interval: config.client_send_interval,
            main_buffer_size: config.limits().main_buffer_size,
            hostname: config.hostname.clone(),
            supervisor: config.supervisor,
        }
    }
}

/// The dispatcher of a single backend.
///
/// Once per cycle `Carbon` connects to its collector and sends, in order,
/// the backend's retry file, its monitoring queue and its main queue. The
/// retry file and the main queue share one budget of `main_buffer_size`
/// lines. Whatever cannot be sent, because the collector is unreachable, a
/// write failed or the budget ran out, is spilled to the retry file. Errors
/// never leave the sink.
pub struct Carbon {
    config: CarbonConfig,
    idx: usize,
    backend: Backend,
    stats: Arc<Stats>,
}

fn connect(addr: &str, timeout: Duration) -> Option<TcpStream> {
    match addr.to_socket_addrs() {
        Ok(srv) => {
            let ips: Vec<_> = srv.collect();
            for ip in ips {
                match TcpStream::connect_timeout(&ip, timeout) {
                    Ok(stream) => return Some(stream),
                    Err(e) => info!(
                        "Unable to connect to carbon at {} using addr {} with error {}",
                        addr, ip, e
                    ),
                }
            }
            None
        }
        Err(e) => {
            info!("Unable to perform DNS lookup on {} with error {}", addr, e);
            None
        }
    }
}

impl Carbon {
    /// The dispatcher of `backend`, which sits at `idx` in the backend
    /// table.
    pub fn new(config: CarbonConfig, idx: usize, backend: Backend, stats: Arc<Stats>) -> Carbon {
        Carbon {
            config: config,
            idx: idx,
            backend: backend,
            stats: stats,
        }
    }

    fn render(&self, metric: &Metric) -> String {
        let mut line = metric
            .as_str()
            .replace(constants::HOSTNAME_PLACEHOLDER, &self.config.hostname);
        line.push('\n');
        line
    }

    /// Append `metrics` to the retry file, counting what was saved and what
    /// was lost.
    fn spill<I>(&self, metrics: I)
    where
        I: IntoIterator<Item = Metric>,
    {
        let metrics: Vec<Metric> = metrics.into_iter().collect();
        if metrics.is_empty() {
            return;
        }
        let total = metrics.len();
        match self.backend.retry.append(metrics) {
            Ok(report) => {
                debug!(
                    "spilled {} metrics of {} to retry file, {} dropped",
                    report.saved,
                    self.backend.address(),
                    report.dropped
                );
                self.stats.incr(self.idx, Field::Saved, report.saved);
                self.stats.incr(self.idx, Field::Dropped, report.dropped);
            }
            Err(e) => {
                error!("unable to save {} metrics: {}", total, e);
                self.stats.incr(self.idx, Field::Dropped, total);
            }
        }
    }

    /// Write `metrics` in order, at most `limit` of them, before `deadline`.
    /// Returns the number written.
    ///
    /// Lines beyond `limit` are spilled. On a write error, or once `deadline`
    /// has passed, the pending line and every line after it are spilled and
    /// the connection is dropped. Without a connection everything is spilled.
    fn ship(
        &self,
        conn: &mut Option<TcpStream>,
        metrics: Vec<Metric>,
        limit: usize,
        deadline: Instant,
    ) -> usize {
        let mut metrics = metrics.into_iter();
        let mut sent = 0;
        let mut failed = None;
        if let Some(ref mut stream) = *conn {
            while sent < limit {
                let metric = match metrics.next() {
                    Some(metric) => metric,
                    None => break,
                };
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining == Duration::from_secs(0) {
                    warn!(
                        "write deadline to carbon at {} exceeded",
                        self.backend.address()
                    );
                    failed = Some(metric);
                    break;
                }
                // shrink to what is left of the cycle
                if let Err(e) = stream.set_write_timeout(Some(remaining)) {
                    warn!("unable to set write deadline: {}", e);
                    failed = Some(metric);
                    break;
                }
                if let Err(e) = stream.write_all(self.render(&metric).as_bytes()) {
                    warn!(
                        "unable to write to carbon at {}: {}",
                        self.backend.address(),
                        e
                    );
                    failed = Some(metric);
                    break;
                }
                sent += 1;
            }
        }
        if let Some(metric) = failed {
            *conn = None;
            self.spill(iter::once(metric).chain(metrics));
        } else {
            self.spill(metrics);
        }
        self.stats.incr(self.idx, Field::Sent, sent);
        sent
    }

    /// Spill everything waiting in the monitoring and main queues.
    fn spill_queues(&self) {
        let monitoring = &self.backend.monitoring;
        self.spill(monitoring.take(monitoring.len()));
        let main = &self.backend.main;
        self.spill(main.take(main.len()));
    }
}

impl Sink for Carbon {
    fn flush_interval(&self) -> u64 {
        self.config.flush_interval
    }

    /// One send cycle.
    fn flush(&mut self) {
        self.config.supervisor.notify();

        let timeout = Duration::from_secs(self.config.connect_timeout);
        let mut conn = match connect(self.backend.address(), timeout) {
            Some(stream) => Some(stream),
            None => {
                warn!(
                    "carbon at {} is unreachable, saving metrics to retry file",
                    self.backend.address()
                );
                self.spill_queues();
                return;
            }
        };

        // one deadline for the whole cycle, not per write
        let deadline = Instant::now() + Duration::from_secs(self.config.write_timeout);

        let mut budget = self.config.main_buffer_size;

        // a connection lost before this point leaves the retry file alone
        if conn.is_some() {
            match self.backend.retry.drain_all() {
                Ok(retried) => {
                    let sent = self.ship(&mut conn, retried, budget, deadline);
                    self.stats.incr(self.idx, Field::FromRetry, sent);
                    budget -= sent;
                }
                Err(e) => error!("unable to read retry file: {}", e),
            }
        }

        let monitoring = {
            let q = &self.backend.monitoring;
            q.take(q.len())
        };
        self.ship(&mut conn, monitoring, usize::max_value(), deadline);

        let main = {
            let q = &self.backend.main;
            q.take(q.len())
        };
        self.ship(&mut conn, main, budget, deadline);

        trace!("send cycle to {} done", self.backend.address());
    }
}
