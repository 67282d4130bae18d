//! The Carbon plaintext protocol: `<name> <value> <timestamp>`.

use std::str::FromStr;

/// The three fields of a plaintext line, borrowed from the line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fields<'a> {
    /// Dotted metric path.
    pub name: &'a str,
    /// Raw, unparsed value field.
    pub value: &'a str,
    /// Raw, unparsed timestamp field.
    pub timestamp: &'a str,
}

/// Split a single plaintext line into its three whitespace separated fields.
///
/// Returns `None` if the line does not have exactly three fields.
pub fn split_graphite(source: &str) -> Option<Fields> {
    let mut iter = source.split_whitespace();
    let name = iter.next()?;
    let value = iter.next()?;
    let timestamp = iter.next()?;
    if iter.next().is_some() {
        return None;
    }
    Some(Fields {
        name: name,
        value: value,
        timestamp: timestamp,
    })
}

/// Parse a single plaintext line into name, value and unix timestamp.
pub fn parse_graphite(source: &str) -> Option<(&str, f64, i64)> {
    let fields = split_graphite(source)?;
    let parsed_val = match f64::from_str(fields.value) {
        Ok(f) => f,
        Err(_) => return None,
    };
    let parsed_time = match i64::from_str(fields.timestamp) {
        Ok(t) => t,
        Err(_) => return None,
    };
    Some((fields.name, parsed_val, parsed_time))
}

/// Format one plaintext line. Values are written with two decimals, the way
/// aggregated metrics leave grafsy.
pub fn format_graphite(name: &str, value: f64, timestamp: i64) -> String {
    format!("{} {:.2} {}", name, value, timestamp)
}
