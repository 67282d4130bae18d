//! Line validation and rename rules.
//!
//! Every line a producer hands to grafsy goes through the `Validator` before
//! it may enter a queue. The validator rewrites the line with the first
//! matching rename rule, checks it against the allowed-metrics pattern and
//! decides whether the line is aggregated or forwarded unchanged.

use buckets::Prefixes;
use metric::Metric;
use regex::Regex;

mod overwrite;

pub use self::overwrite::{overwrite, Overwrite};

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The line was empty after renaming.
    Empty,
    /// The line did not match the allowed-metrics pattern.
    Invalid(String),
}

/// Where an accepted line goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Into the aggregation queue.
    Aggregate(Metric),
    /// Straight to every backend.
    Forward(Metric),
}

/// The validation pipeline shared by every ingestion path.
#[derive(Debug, Clone)]
pub struct Validator {
    allowed: Regex,
    prefixes: Prefixes,
    overwrites: Vec<Overwrite>,
}

impl Validator {
    /// Build a validator from an allowed-metrics pattern, aggregation
    /// prefixes and ordered rename rules.
    pub fn new(
        allowed: &str,
        prefixes: Prefixes,
        overwrites: Vec<Overwrite>,
    ) -> Result<Validator, ::regex::Error> {
        Ok(Validator {
            allowed: Regex::new(allowed)?,
            prefixes: prefixes,
            overwrites: overwrites,
        })
    }

    /// Rename, validate and classify a single line.
    pub fn process(&self, line: &str) -> Result<Verdict, FilterError> {
        let line = overwrite(&self.overwrites, line);
        if line.is_empty() {
            return Err(FilterError::Empty);
        }
        if !self.allowed.is_match(&line) {
            return Err(FilterError::Invalid(line.into_owned()));
        }
        let metric = Metric::new(line.into_owned());
        if self.prefixes.split(metric.name()).is_some() {
            Ok(Verdict::Aggregate(metric))
        } else {
            Ok(Verdict::Forward(metric))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ALLOWED: &str = r"^[-a-zA-Z0-9_.]+ [-+0-9.eE]+ [0-9]{10}$";

    fn validator(overwrites: Vec<Overwrite>) -> Validator {
        Validator::new(ALLOWED, Prefixes::default(), overwrites).unwrap()
    }

    #[test]
    fn forward_plain_metric() {
        let v = validator(Vec::new());
        assert_eq!(
            v.process("app.hits 1 1500000000"),
            Ok(Verdict::Forward(Metric::new("app.hits 1 1500000000")))
        );
    }

    #[test]
    fn aggregate_prefixed_metric() {
        let v = validator(Vec::new());
        assert_eq!(
            v.process("SUM.app.hits 1 1500000000"),
            Ok(Verdict::Aggregate(Metric::new("SUM.app.hits 1 1500000000")))
        );
    }

    #[test]
    fn reject_malformed() {
        let v = validator(Vec::new());
        assert_eq!(
            v.process("not-a-metric"),
            Err(FilterError::Invalid("not-a-metric".to_string()))
        );
        assert_eq!(v.process(""), Err(FilterError::Empty));
    }

    #[test]
    fn rename_before_validation() {
        let v = validator(vec![Overwrite::new("^bad name", "good_name").unwrap()]);
        assert_eq!(
            v.process("bad name 1 1500000000"),
            Ok(Verdict::Forward(Metric::new("good_name 1 1500000000")))
        );
    }

    #[test]
    fn rename_into_aggregation() {
        let v = validator(vec![Overwrite::new("^hits\\.", "SUM.hits.").unwrap()]);
        assert_eq!(
            v.process("hits.total 3 1500000000"),
            Ok(Verdict::Aggregate(Metric::new("SUM.hits.total 3 1500000000")))
        );
    }
}
