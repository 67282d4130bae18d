//! Producers of metric lines.
//!
//! A source runs forever on its own thread and pushes lines into the
//! pipeline: `Tcp` and `MetricDir` through the `Router`, `Internal` straight
//! into the backends' monitoring queues.

mod internal;
mod metric_dir;
mod tcp;

pub use self::internal::Internal;
pub use self::metric_dir::MetricDir;
pub use self::tcp::Tcp;

/// A source of metric lines.
pub trait Source {
    /// Run the source. Does not return under normal operation.
    fn run(&mut self) -> ();
}
