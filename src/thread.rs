//! Named worker threads.
//!
//! Every long-lived worker in grafsy gets an OS thread with a name so that
//! panics and debugger output say which component died.

use std::io;
use std::thread;

/// Handle to a spawned worker.
pub struct ThreadHandle {
    /// Name the thread was spawned with.
    pub name: String,

    /// JoinHandle for the executing thread.
    pub handle: thread::JoinHandle<()>,
}

impl ThreadHandle {
    /// Join the given Thread, blocking until it exits.
    ///
    /// Workers run forever, so this only returns when a worker panicked.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("worker thread {} panicked", self.name);
        }
    }
}

/// Spawns a new named thread executing the provided closure.
pub fn spawn<S, F>(name: S, f: F) -> io::Result<ThreadHandle>
where
    S: Into<String>,
    F: Send + 'static + FnOnce() -> (),
{
    let name = name.into();
    let handle = thread::Builder::new().name(name.clone()).spawn(f)?;
    Ok(ThreadHandle {
        name: name,
        handle: handle,
    })
}
