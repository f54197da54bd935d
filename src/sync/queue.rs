//! Polling FIFO between the network-arrival context and the tick

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Unbounded single-producer/single-consumer FIFO.
///
/// `recv` never blocks; it returns `None` when nothing is waiting. Clones
/// share the same buffer, so the producer half can live on a different task
/// or thread than the consumer while delivery order stays arrival order.
#[derive(Debug)]
pub struct MessageQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Enqueue at the tail
    pub fn send(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    /// Dequeue the oldest item, or `None` if empty
    pub fn recv(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_signals_none() {
        let queue: MessageQueue<u32> = MessageQueue::new();
        assert!(queue.recv().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn delivers_in_arrival_order() {
        let queue = MessageQueue::new();
        queue.send("a");
        queue.send("b");
        assert_eq!(queue.recv(), Some("a"));
        queue.send("c");
        assert_eq!(queue.recv(), Some("b"));
        assert_eq!(queue.recv(), Some("c"));
        assert_eq!(queue.recv(), None);
    }

    #[test]
    fn clones_share_one_buffer() {
        let producer = MessageQueue::new();
        let consumer = producer.clone();
        producer.send(1);
        producer.send(2);
        assert_eq!(consumer.len(), 2);
        assert_eq!(consumer.recv(), Some(1));
        assert_eq!(producer.len(), 1);
    }

    #[test]
    fn producer_on_another_thread_keeps_order() {
        let queue = MessageQueue::new();
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..1000 {
                producer.send(i);
            }
        });

        let mut received = Vec::new();
        while received.len() < 1000 {
            match queue.recv() {
                Some(v) => received.push(v),
                None => std::thread::yield_now(),
            }
        }
        handle.join().unwrap();

        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// `Some(v)` is a send, `None` is a recv
            #[test]
            fn recv_sequence_is_send_sequence(ops in prop::collection::vec(prop::option::of(any::<u16>()), 0..200)) {
                let queue = MessageQueue::new();
                let mut sent = Vec::new();
                let mut received = Vec::new();

                for op in ops {
                    match op {
                        Some(v) => {
                            queue.send(v);
                            sent.push(v);
                        }
                        None => {
                            if let Some(v) = queue.recv() {
                                received.push(v);
                            }
                        }
                    }
                }
                while let Some(v) = queue.recv() {
                    received.push(v);
                }

                prop_assert_eq!(received, sent);
            }
        }
    }
}
