//! Buckets are the aggregation window storage.
//!
//! A metric whose name starts with one of the four configured prefixes is not
//! forwarded as-is. Its samples are folded into a bucket keyed by the kind of
//! aggregation and the bare name, the name without the prefix. When the window
//! closes every bucket becomes exactly one metric line and the buckets are
//! thrown away.

use metric::Metric;
use seahash::SeaHasher;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

type HashMapSea<K, V> = HashMap<K, V, BuildHasherDefault<SeaHasher>>;

/// The four supported aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Aggregation {
    /// Sum of all samples.
    Sum,
    /// Arithmetic mean of all samples.
    Avg,
    /// Smallest sample.
    Min,
    /// Largest sample.
    Max,
}

/// The configured name prefixes that select an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefixes {
    /// Prefix selecting `Aggregation::Sum`.
    pub sum: String,
    /// Prefix selecting `Aggregation::Avg`.
    pub avg: String,
    /// Prefix selecting `Aggregation::Min`.
    pub min: String,
    /// Prefix selecting `Aggregation::Max`.
    pub max: String,
}

impl Default for Prefixes {
    fn default() -> Prefixes {
        Prefixes {
            sum: "SUM.".to_string(),
            avg: "AVG.".to_string(),
            min: "MIN.".to_string(),
            max: "MAX.".to_string(),
        }
    }
}

impl Prefixes {
    /// Find the aggregation selected by `name` and return it with the bare
    /// name. Prefixes are checked in the order sum, avg, min, max. A name that
    /// is nothing but a prefix is not an aggregated metric.
    pub fn split<'a>(&self, name: &'a str) -> Option<(Aggregation, &'a str)> {
        let candidates = [
            (Aggregation::Sum, &self.sum),
            (Aggregation::Avg, &self.avg),
            (Aggregation::Min, &self.min),
            (Aggregation::Max, &self.max),
        ];
        for &(kind, prefix) in &candidates {
            if prefix.is_empty() {
                continue;
            }
            if name.starts_with(prefix.as_str()) && name.len() > prefix.len() {
                return Some((kind, &name[prefix.len()..]));
            }
        }
        None
    }
}

/// Running state of one (aggregation, name) pair inside a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    value: f64,
    count: u64,
}

impl Bucket {
    fn new(value: f64) -> Bucket {
        Bucket {
            value: value,
            count: 1,
        }
    }

    fn add(&mut self, kind: Aggregation, value: f64) {
        match kind {
            Aggregation::Sum | Aggregation::Avg => self.value += value,
            Aggregation::Min => if value < self.value {
                self.value = value
            },
            Aggregation::Max => if value > self.value {
                self.value = value
            },
        }
        self.count += 1;
    }

    /// The value the bucket reports when its window closes.
    pub fn value(&self, kind: Aggregation) -> f64 {
        match kind {
            Aggregation::Avg => self.value / self.count as f64,
            _ => self.value,
        }
    }

    /// Number of samples folded into the bucket.
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Buckets stores all aggregated samples of the current window.
#[derive(Debug, Default)]
pub struct Buckets {
    buckets: HashMapSea<(Aggregation, String), Bucket>,
}

impl Buckets {
    /// Fold a sample into the bucket of (`kind`, `name`), creating the bucket
    /// on its first sample.
    pub fn add(&mut self, kind: Aggregation, name: &str, value: f64) {
        if let Some(bkt) = self.buckets.get_mut(&(kind, name.to_string())) {
            bkt.add(kind, value);
            return;
        }
        self.buckets
            .insert((kind, name.to_string()), Bucket::new(value));
    }

    /// Look up the bucket of (`kind`, `name`).
    pub fn get(&self, kind: Aggregation, name: &str) -> Option<&Bucket> {
        self.buckets.get(&(kind, name.to_string()))
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no sample arrived in this window.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Close the window: turn every bucket into a metric stamped with
    /// `timestamp` and discard the buckets. Output is sorted by name, then
    /// aggregation.
    pub fn close(&mut self, timestamp: i64) -> Vec<Metric> {
        let mut closed: Vec<_> = self.buckets.drain().collect();
        closed.sort_by(|a, b| (&(a.0).1, (a.0).0).cmp(&(&(b.0).1, (b.0).0)));
        closed
            .into_iter()
            .map(|((kind, name), bkt)| Metric::from_parts(&name, bkt.value(kind), timestamp))
            .collect()
    }
}
