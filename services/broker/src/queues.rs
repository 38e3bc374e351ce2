//! Broker-wide table of declared queues

use crate::{BrokerError, BrokerResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use exchange::{InMemoryQueue, QueueRef};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Prefix for names the broker generates when a client declares `""`
pub const GENERATED_PREFIX: &str = "amq.gen-";

#[derive(Debug, Default)]
pub struct QueueTable {
    queues: DashMap<String, Arc<InMemoryQueue>>,
    generated: AtomicU64,
}

/// Result of a queue declaration
#[derive(Debug, Clone)]
pub struct Declared {
    pub queue: Arc<InMemoryQueue>,
    pub name: String,
    /// False when the queue already existed
    pub created: bool,
}

impl QueueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name`, generating one if empty. Passive declares only look
    /// the queue up.
    pub fn declare(&self, name: &str, passive: bool) -> BrokerResult<Declared> {
        if passive {
            let queue = self
                .get(name)
                .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
            return Ok(Declared {
                queue,
                name: name.to_string(),
                created: false,
            });
        }

        let name = if name.is_empty() {
            self.generate_name()
        } else {
            name.to_string()
        };

        match self.queues.entry(name.clone()) {
            Entry::Occupied(entry) => Ok(Declared {
                queue: Arc::clone(entry.get()),
                name,
                created: false,
            }),
            Entry::Vacant(entry) => {
                let queue = Arc::new(InMemoryQueue::new(name.clone()));
                entry.insert(Arc::clone(&queue));
                debug!("Declared queue {}", name);
                Ok(Declared {
                    queue,
                    name,
                    created: true,
                })
            }
        }
    }

    fn generate_name(&self) -> String {
        let id = self.generated.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", GENERATED_PREFIX, id)
    }

    pub fn get(&self, name: &str) -> Option<Arc<InMemoryQueue>> {
        self.queues.get(name).map(|q| Arc::clone(q.value()))
    }

    /// Shared handle suitable for binding
    pub fn lookup(&self, name: &str) -> BrokerResult<QueueRef> {
        self.get(name)
            .map(QueueRef::from)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_is_idempotent() {
        let table = QueueTable::new();
        let first = table.declare("orders", false).unwrap();
        let second = table.declare("orders", false).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.queue, &second.queue));
        assert_eq!(table.lookup("orders").unwrap(), QueueRef::from(first.queue));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let table = QueueTable::new();
        let a = table.declare("", false).unwrap();
        let b = table.declare("", false).unwrap();
        assert!(a.name.starts_with(GENERATED_PREFIX));
        assert_ne!(a.name, b.name);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_passive_declare_of_missing_queue() {
        let table = QueueTable::new();
        let err = table.declare("ghost", true).unwrap_err();
        assert_eq!(err.reply_code(), 404);
        assert!(table.is_empty());
    }
}
