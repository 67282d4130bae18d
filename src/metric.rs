//! The unit of data moving through grafsy: one Carbon plaintext line.

use protocols::graphite;
use std::fmt;

/// A single metric line, `<dotted.name> <value> <unix timestamp>`.
///
/// A `Metric` is moved by value from queue to queue and is never mutated once
/// built. Whether a `Metric` went through validation is a property of where
/// it came from: the `Router` only builds them from lines that matched the
/// configured pattern, the aggregator and self-monitoring build them from
/// their own output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metric {
    line: String,
}

impl Metric {
    /// Wrap a line. No validation is performed.
    pub fn new<S>(line: S) -> Metric
    where
        S: Into<String>,
    {
        Metric { line: line.into() }
    }

    /// Build a line from its parts, value formatted with two decimals.
    pub fn from_parts(name: &str, value: f64, timestamp: i64) -> Metric {
        Metric::new(graphite::format_graphite(name, value, timestamp))
    }

    /// The metric name, the first whitespace separated field.
    pub fn name(&self) -> &str {
        self.line.split_whitespace().next().unwrap_or("")
    }

    /// The whole line, without a line terminator.
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Give up the line.
    pub fn into_string(self) -> String {
        self.line
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.line)
    }
}
