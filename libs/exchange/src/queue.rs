//! # Queue Collaborator
//!
//! The routing core never owns queue storage. It sees queues through the
//! [`Queue`] trait and holds them as [`QueueRef`], a shared handle whose
//! equality is pointer identity. A binding stores a `QueueRef`, so a bound
//! queue stays alive until every binding referencing it is removed, even if
//! its creator dropped its own handle right after binding.

use crate::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A delivery target
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Accept a routed message. Must not block on I/O.
    fn deliver(&self, message: Arc<Message>);
}

/// Shared, identity-compared handle to a queue
#[derive(Clone)]
pub struct QueueRef(Arc<dyn Queue>);

impl QueueRef {
    pub fn new<Q: Queue + 'static>(queue: Q) -> Self {
        Self(Arc::new(queue))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn deliver(&self, message: Arc<Message>) {
        self.0.deliver(message)
    }

    pub fn as_arc(&self) -> &Arc<dyn Queue> {
        &self.0
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl<Q: Queue + 'static> From<Arc<Q>> for QueueRef {
    fn from(queue: Arc<Q>) -> Self {
        Self(queue)
    }
}

impl From<Arc<dyn Queue>> for QueueRef {
    fn from(queue: Arc<dyn Queue>) -> Self {
        Self(queue)
    }
}

impl PartialEq for QueueRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for QueueRef {}

impl Hash for QueueRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state)
    }
}

impl fmt::Debug for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueRef({:?} @ {:p})", self.name(), self.addr())
    }
}

/// FIFO queue held in memory; what `queue.declare` creates
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    messages: Mutex<VecDeque<Arc<Message>>>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Mutex::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn pop(&self) -> Option<Arc<Message>> {
        self.messages.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<Arc<Message>> {
        self.messages.lock().drain(..).collect()
    }

    /// Drop every stored message, returning how many there were
    pub fn purge(&self) -> usize {
        let mut messages = self.messages.lock();
        let count = messages.len();
        messages.clear();
        count
    }
}

impl Queue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, message: Arc<Message>) {
        self.messages.lock().push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_not_name_equality() {
        let a = QueueRef::new(InMemoryQueue::new("same"));
        let b = QueueRef::new(InMemoryQueue::new("same"));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let set: HashSet<_> = [a.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_in_memory_queue_fifo() {
        let queue = InMemoryQueue::new("q");
        queue.deliver(Arc::new(Message::new("", "q", &b"one"[..])));
        queue.deliver(Arc::new(Message::new("", "q", &b"two"[..])));

        assert_eq!(queue.len(), 2);
        assert_eq!(&queue.pop().unwrap().payload[..], b"one");
        assert_eq!(queue.purge(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_from_arc_keeps_identity() {
        let queue = Arc::new(InMemoryQueue::new("q"));
        let a = QueueRef::from(queue.clone());
        let b = QueueRef::from(queue);
        assert_eq!(a, b);
    }
}
