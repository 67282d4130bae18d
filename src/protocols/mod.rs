//! Wire protocols grafsy speaks.

pub mod graphite;
