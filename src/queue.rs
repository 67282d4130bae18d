//! Fixed-capacity metric queues.
//!
//! Every hand-off between grafsy workers goes through a `Queue`. Producers
//! only ever `try_push` and never wait: a full queue is backpressure and the
//! caller decides how to count the loss. Consumers read exactly the number
//! of items they saw queued when they started, so a drain never waits on an
//! empty queue either.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use metric::Metric;

/// A bounded multi-producer, multi-consumer queue of `Metric`s.
#[derive(Debug, Clone)]
pub struct Queue {
    send: Sender<Metric>,
    recv: Receiver<Metric>,
}

impl Queue {
    /// Create a queue holding at most `capacity` metrics.
    pub fn new(capacity: usize) -> Queue {
        let (send, recv) = bounded(capacity);
        Queue {
            send: send,
            recv: recv,
        }
    }

    /// Enqueue without blocking. A full queue hands the metric back.
    pub fn try_push(&self, metric: Metric) -> Result<(), Metric> {
        match self.send.try_send(metric) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(m)) | Err(TrySendError::Disconnected(m)) => Err(m),
        }
    }

    /// Dequeue without blocking.
    pub fn pop(&self) -> Option<Metric> {
        match self.recv.try_recv() {
            Ok(m) => Some(m),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take up to `n` metrics off the queue.
    pub fn take(&self, n: usize) -> Vec<Metric> {
        let mut res = Vec::with_capacity(n);
        for _ in 0..n {
            match self.pop() {
                Some(m) => res.push(m),
                None => break,
            }
        }
        res
    }

    /// Number of metrics currently queued.
    pub fn len(&self) -> usize {
        self.recv.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.recv.is_empty()
    }

    /// The fixed capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.send.capacity().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn full_queue_rejects_without_growing() {
        let q = Queue::new(2);
        assert!(q.try_push(Metric::new("a 1 1")).is_ok());
        assert!(q.try_push(Metric::new("b 2 2")).is_ok());
        let back = q.try_push(Metric::new("c 3 3"));
        assert_eq!(back, Err(Metric::new("c 3 3")));
        assert_eq!(q.len(), 2);
        assert_eq!(q.capacity(), 2);
    }

    #[test]
    fn take_preserves_order_and_stops_when_empty() {
        let q = Queue::new(4);
        q.try_push(Metric::new("a 1 1")).unwrap();
        q.try_push(Metric::new("b 2 2")).unwrap();
        let got = q.take(10);
        assert_eq!(got, vec![Metric::new("a 1 1"), Metric::new("b 2 2")]);
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn clones_share_storage() {
        let q = Queue::new(1);
        let p = q.clone();
        p.try_push(Metric::new("a 1 1")).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some(Metric::new("a 1 1")));
    }
}
