//! Thread-safe FIFO queues crossing the application/worker boundary.
//!
//! Callers never lock anything themselves; each operation takes the internal
//! mutex for its own duration only.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mio::Waker;
use roverlink_wire::{ChannelId, CommandRecord};
use tracing::warn;

use crate::event::TransportEvent;

/// Shared FIFO. Clones are handles to the same queue.
#[derive(Debug)]
pub struct FifoQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
    capacity: Option<usize>,
}

impl<T> Clone for FifoQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            capacity: self.capacity,
        }
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> FifoQueue<T> {
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// A queue holding at most `capacity` items; pushing onto a full queue
    /// drops the oldest item. Putting a record back at the head counts
    /// against the same bound.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    /// Append an item. Returns the evicted oldest item when the bound was hit.
    pub fn push(&self, item: T) -> Option<T> {
        let mut queue = self.lock();
        let evicted = match self.capacity {
            Some(capacity) if queue.len() >= capacity => queue.pop_front(),
            _ => None,
        };
        queue.push_back(item);
        evicted
    }

    /// Remove the oldest item. `None` is the ordinary empty outcome.
    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Remove everything, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    /// Discard everything and return how many items were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outbound records waiting for a writable channel.
pub type CommandQueue = FifoQueue<CommandRecord>;

/// Inbound records and channel status changes.
pub type EventQueue = FifoQueue<TransportEvent>;

impl FifoQueue<CommandRecord> {
    /// Pop the oldest record routable to `channel`, leaving the others in place.
    pub fn pop_for(&self, channel: ChannelId) -> Option<CommandRecord> {
        let mut queue = self.lock();
        let pos = queue
            .iter()
            .position(|record| record.destination().matches(channel))?;
        queue.remove(pos)
    }

    /// Returns true if some queued record may go out on `channel`.
    pub fn has_pending_for(&self, channel: ChannelId) -> bool {
        self.lock()
            .iter()
            .any(|record| record.destination().matches(channel))
    }

    /// Put back a record that was popped but could not be written.
    ///
    /// It was the oldest match for its channel, so the head keeps per-destination
    /// order intact. If producers filled the queue meanwhile, the returned
    /// record is the oldest one and is dropped instead of being put back.
    pub(crate) fn push_front(&self, record: CommandRecord) -> Option<CommandRecord> {
        let mut queue = self.lock();
        if matches!(self.capacity, Some(capacity) if queue.len() >= capacity) {
            return Some(record);
        }
        queue.push_front(record);
        None
    }
}

/// When a producer handle actually enqueues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPolicy {
    /// Every record is enqueued.
    #[default]
    Always,
    /// A record equal to the previous one from the same handle is skipped.
    IfChanged,
}

/// Application-side producer handle for the outbound queue.
///
/// Wakes the transport worker after every push so a record does not wait for
/// the readiness timeout.
#[derive(Debug)]
pub struct Outbox {
    queue: CommandQueue,
    waker: Option<Arc<Waker>>,
    policy: SendPolicy,
    last: Option<CommandRecord>,
}

impl Outbox {
    pub fn new(queue: CommandQueue, waker: Option<Arc<Waker>>, policy: SendPolicy) -> Self {
        Self {
            queue,
            waker,
            policy,
            last: None,
        }
    }

    /// Enqueue a record. Returns false if the send policy skipped it.
    pub fn send(&mut self, record: CommandRecord) -> bool {
        if self.policy == SendPolicy::IfChanged && self.last.as_ref() == Some(&record) {
            return false;
        }
        if self.policy == SendPolicy::IfChanged {
            self.last = Some(record.clone());
        }

        if let Some(evicted) = self.queue.push(record) {
            warn!(
                record = %evicted,
                destination = %evicted.destination(),
                "outbound queue full; dropped oldest record"
            );
        }

        if let Some(waker) = &self.waker {
            if let Err(err) = waker.wake() {
                warn!(error = %err, "failed to wake transport worker");
            }
        }
        true
    }

    pub fn policy(&self) -> SendPolicy {
        self.policy
    }

    /// Number of records still waiting to be written.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Another handle to the same queue with its own policy and history.
    pub fn with_policy(&self, policy: SendPolicy) -> Self {
        Self::new(self.queue.clone(), self.waker.clone(), policy)
    }
}

#[cfg(test)]
mod tests {
    use roverlink_wire::Destination;

    use super::*;

    fn rec(name: &str, value: &str, destination: Destination) -> CommandRecord {
        CommandRecord::new(name, value, destination).unwrap()
    }

    #[test]
    fn fifo_order() {
        let queue = FifoQueue::unbounded();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.drain(), vec![2, 3]);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let queue = FifoQueue::with_capacity(Some(2));
        assert_eq!(queue.push("a"), None);
        assert_eq!(queue.push("b"), None);
        assert_eq!(queue.push("c"), Some("a"));
        assert_eq!(queue.drain(), vec!["b", "c"]);
    }

    #[test]
    fn pop_for_filters_by_destination() {
        let queue = CommandQueue::unbounded();
        queue.push(rec("led", "green", Destination::ChannelA));
        queue.push(rec("xy", "1.0,0.0", Destination::ChannelB));
        queue.push(rec("speak", "hi", Destination::Any));

        let b = queue.pop_for(ChannelId::B).unwrap();
        assert_eq!(b.name(), "xy");
        let b = queue.pop_for(ChannelId::B).unwrap();
        assert_eq!(b.name(), "speak");
        assert!(queue.pop_for(ChannelId::B).is_none());
        assert!(queue.has_pending_for(ChannelId::A));
        assert!(!queue.has_pending_for(ChannelId::B));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn same_destination_keeps_enqueue_order() {
        let queue = CommandQueue::unbounded();
        for i in 0..5 {
            queue.push(rec("gear", &i.to_string(), Destination::ChannelB));
            queue.push(rec("arm", &i.to_string(), Destination::ChannelA));
        }
        let values: Vec<String> = std::iter::from_fn(|| queue.pop_for(ChannelId::B))
            .map(|r| r.value().to_string())
            .collect();
        assert_eq!(values, vec!["0", "1", "2", "3", "4"]);
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn push_front_restores_head() {
        let queue = CommandQueue::unbounded();
        queue.push(rec("gear", "1", Destination::ChannelB));
        queue.push(rec("gear", "2", Destination::ChannelB));
        let first = queue.pop_for(ChannelId::B).unwrap();
        assert!(queue.push_front(first).is_none());
        assert_eq!(queue.pop_for(ChannelId::B).unwrap().value(), "1");
    }

    #[test]
    fn push_front_respects_capacity() {
        let queue = CommandQueue::with_capacity(Some(2));
        queue.push(rec("gear", "1", Destination::ChannelB));
        queue.push(rec("gear", "2", Destination::ChannelB));
        let first = queue.pop_for(ChannelId::B).unwrap();
        queue.push(rec("gear", "3", Destination::ChannelB));

        let dropped = queue.push_front(first).unwrap();
        assert_eq!(dropped.value(), "1");
        assert_eq!(queue.len(), 2);
        let values: Vec<String> = std::iter::from_fn(|| queue.pop_for(ChannelId::B))
            .map(|r| r.value().to_string())
            .collect();
        assert_eq!(values, vec!["2", "3"]);
    }

    #[test]
    fn outbox_if_changed_skips_repeats() {
        let queue = CommandQueue::unbounded();
        let mut outbox = Outbox::new(queue.clone(), None, SendPolicy::IfChanged);

        assert!(outbox.send(rec("xy", "1.0,0.0", Destination::ChannelB)));
        assert!(!outbox.send(rec("xy", "1.0,0.0", Destination::ChannelB)));
        assert!(outbox.send(rec("xy", "0.0,0.0", Destination::ChannelB)));
        assert!(outbox.send(rec("xy", "1.0,0.0", Destination::ChannelB)));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn outbox_always_sends_repeats() {
        let queue = CommandQueue::unbounded();
        let mut outbox = Outbox::new(queue.clone(), None, SendPolicy::Always);
        let ping = CommandRecord::ping(Destination::ChannelB);

        assert!(outbox.send(ping.clone()));
        assert!(outbox.send(ping));
        assert_eq!(outbox.pending(), 2);
    }

    #[test]
    fn with_policy_starts_fresh_history() {
        let queue = CommandQueue::unbounded();
        let mut first = Outbox::new(queue.clone(), None, SendPolicy::IfChanged);
        first.send(rec("led", "red", Destination::ChannelA));

        let mut second = first.with_policy(SendPolicy::IfChanged);
        assert!(second.send(rec("led", "red", Destination::ChannelA)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn concurrent_producers() {
        let queue = CommandQueue::unbounded();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let mut outbox = Outbox::new(queue.clone(), None, SendPolicy::Always);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        outbox.send(rec("gear", &format!("{t}-{i}"), Destination::ChannelB));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 400);
    }
}
