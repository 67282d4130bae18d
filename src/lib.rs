//! Grafsy is a local relay for Carbon plaintext metrics. Producers on the
//! same host write lines of the form `<name> <value> <timestamp>` to a TCP
//! socket or drop files of such lines into a directory. Grafsy validates and
//! renames them, optionally aggregates prefixed metrics over a time window and
//! forwards everything to one or more Carbon collectors.
//!
//! Grafsy never blocks a producer. Every queue is bounded and every metric
//! that cannot be queued is counted as dropped. When a collector is
//! unreachable its metrics are spilled to a per-collector retry file and sent
//! on a later cycle, oldest-at-risk first.
//!
//! The daemon reports on itself: once a minute its counters are turned into
//! metric lines and shipped through the same pipeline.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]
extern crate chrono;
extern crate clap;
extern crate crossbeam_channel;
extern crate glob;
extern crate libc;
extern crate regex;
extern crate seahash;
extern crate serde;
extern crate toml;

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate lazy_static;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
extern crate tempdir;

pub mod aggregator;
pub mod backend;
pub mod buckets;
pub mod client;
pub mod config;
pub mod constants;
pub mod filter;
pub mod metric;
pub mod protocols;
pub mod queue;
pub mod retry;
pub mod router;
pub mod sink;
pub mod source;
pub mod stats;
pub mod supervisor;
pub mod thread;
pub mod time;
pub mod util;
