//! Operational counters.
//!
//! All counters live behind one lock, so a snapshot-and-reset sees every
//! counter at the same instant.

use std::sync::Mutex;

/// Per-backend counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStat {
    /// Lines written to the backend.
    pub sent: usize,
    /// Lines spilled from a queue into the retry file.
    pub saved: usize,
    /// Lines lost: queue overflow, retry file I/O errors, compaction.
    pub dropped: usize,
    /// Lines written to the backend out of the retry file.
    pub from_retry: usize,
    /// Lines handed to the aggregator.
    pub aggregated: usize,
}

/// Process wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStat {
    /// Lines read from the network.
    pub net: usize,
    /// Lines read from the metric directory.
    pub dir: usize,
    /// Lines rejected by validation.
    pub invalid: usize,
}

/// Selects one of the per-backend counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `BackendStat::sent`
    Sent,
    /// `BackendStat::saved`
    Saved,
    /// `BackendStat::dropped`
    Dropped,
    /// `BackendStat::from_retry`
    FromRetry,
    /// `BackendStat::aggregated`
    Aggregated,
}

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Process wide counters.
    pub server: ServerStat,
    /// Per-backend counters, in backend order.
    pub backends: Vec<BackendStat>,
}

impl BackendStat {
    fn get_mut(&mut self, field: Field) -> &mut usize {
        match field {
            Field::Sent => &mut self.sent,
            Field::Saved => &mut self.saved,
            Field::Dropped => &mut self.dropped,
            Field::FromRetry => &mut self.from_retry,
            Field::Aggregated => &mut self.aggregated,
        }
    }
}

/// The one shared counters block of a grafsy process.
#[derive(Debug)]
pub struct Stats {
    inner: Mutex<Snapshot>,
}

impl Stats {
    /// Counters for `backends` backends, all zero.
    pub fn new(backends: usize) -> Stats {
        Stats {
            inner: Mutex::new(Snapshot {
                server: ServerStat::default(),
                backends: vec![BackendStat::default(); backends],
            }),
        }
    }

    fn with<F>(&self, f: F)
    where
        F: FnOnce(&mut Snapshot),
    {
        // A panic while holding the lock cannot leave the plain counters in an
        // inconsistent state, so a poisoned lock is still usable.
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard)
    }

    /// Count lines read from the network.
    pub fn incr_net(&self, n: usize) {
        self.with(|s| s.server.net += n)
    }

    /// Count lines read from the metric directory.
    pub fn incr_dir(&self, n: usize) {
        self.with(|s| s.server.dir += n)
    }

    /// Count lines rejected by validation.
    pub fn incr_invalid(&self, n: usize) {
        self.with(|s| s.server.invalid += n)
    }

    /// Add `n` to `field` of the backend at `idx`.
    pub fn incr(&self, idx: usize, field: Field, n: usize) {
        if n == 0 {
            return;
        }
        self.with(|s| {
            if let Some(b) = s.backends.get_mut(idx) {
                *b.get_mut(field) += n;
            }
        })
    }

    /// Add `n` to `field` of every backend.
    pub fn incr_all(&self, field: Field, n: usize) {
        if n == 0 {
            return;
        }
        self.with(|s| {
            for b in &mut s.backends {
                *b.get_mut(field) += n;
            }
        })
    }

    /// Copy of every counter, leaving them untouched.
    pub fn snapshot(&self) -> Snapshot {
        let mut res = Snapshot::default();
        self.with(|s| res = s.clone());
        res
    }

    /// Copy of every counter, resetting them all to zero under the same lock.
    pub fn snapshot_and_reset(&self) -> Snapshot {
        let mut res = Snapshot::default();
        self.with(|s| {
            res = s.clone();
            s.server = ServerStat::default();
            for b in &mut s.backends {
                *b = BackendStat::default();
            }
        });
        res
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn increments_land_on_the_right_backend() {
        let stats = Stats::new(2);
        stats.incr(1, Field::Dropped, 3);
        stats.incr(0, Field::Sent, 1);
        stats.incr_all(Field::Aggregated, 2);
        stats.incr_invalid(1);
        stats.incr(7, Field::Sent, 1);

        let snap = stats.snapshot();
        assert_eq!(snap.server.invalid, 1);
        assert_eq!(snap.backends[0].sent, 1);
        assert_eq!(snap.backends[0].dropped, 0);
        assert_eq!(snap.backends[1].dropped, 3);
        assert_eq!(snap.backends[0].aggregated, 2);
        assert_eq!(snap.backends[1].aggregated, 2);
    }

    #[test]
    fn snapshot_and_reset_zeroes() {
        let stats = Stats::new(1);
        stats.incr_net(5);
        stats.incr_dir(2);
        stats.incr(0, Field::FromRetry, 4);

        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.server.net, 5);
        assert_eq!(snap.server.dir, 2);
        assert_eq!(snap.backends[0].from_retry, 4);

        assert_eq!(stats.snapshot(), Snapshot {
            server: ServerStat::default(),
            backends: vec![BackendStat::default()],
        });
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(Stats::new(1));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.incr(0, Field::Sent, 1);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(stats.snapshot().backends[0].sent, 4000);
    }
}
