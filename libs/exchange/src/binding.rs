//! # Binding Table
//!
//! Bindings grouped by routing key. Each key carries a compiled form `P`
//! chosen by the exchange kind (nothing for direct, a tokenized pattern for
//! topic), so matching work is done once per distinct key rather than once
//! per binding.
//!
//! ## Concurrency
//!
//! One `parking_lot::RwLock` per table. `insert`/`remove` take the write lock
//! and are serialized with each other and with route snapshots. Route-side
//! lookups take the read lock only long enough to collect the target
//! queues; delivery happens after the lock is released, so a slow queue
//! never holds up bind or unbind.

use crate::QueueRef;
use codec::FieldTable;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// One `(queue, routing key, arguments)` association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: QueueRef,
    pub routing_key: String,
    pub arguments: Option<FieldTable>,
}

impl Binding {
    pub fn new(queue: QueueRef, routing_key: impl Into<String>) -> Self {
        Self {
            queue,
            routing_key: routing_key.into(),
            arguments: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Option<FieldTable>) -> Self {
        self.arguments = arguments.filter(|args| !args.is_empty());
        self
    }

    /// `None` arguments on an unbind match any stored arguments
    fn matches(&self, queue: &QueueRef, arguments: Option<&FieldTable>) -> bool {
        if self.queue != *queue {
            return false;
        }
        match arguments {
            None => true,
            Some(args) if args.is_empty() => true,
            Some(args) => self.arguments.as_ref() == Some(args),
        }
    }
}

#[derive(Debug)]
struct KeyEntry<P> {
    compiled: P,
    bindings: Vec<Binding>,
}

#[derive(Debug)]
pub struct BindingTable<P> {
    keys: RwLock<HashMap<String, KeyEntry<P>>>,
}

impl<P> Default for BindingTable<P> {
    fn default() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }
}

impl<P> BindingTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding; returns false if the identical binding already exists
    pub fn insert(&self, binding: Binding, compile: impl FnOnce(&str) -> P) -> bool {
        let mut keys = self.keys.write();
        let entry = keys
            .entry(binding.routing_key.clone())
            .or_insert_with(|| KeyEntry {
                compiled: compile(&binding.routing_key),
                bindings: Vec::new(),
            });
        if entry.bindings.contains(&binding) {
            return false;
        }
        entry.bindings.push(binding);
        true
    }

    /// Remove the bindings of `queue` under `routing_key`; returns how many went
    pub fn remove(
        &self,
        queue: &QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> usize {
        let mut keys = self.keys.write();
        let Some(entry) = keys.get_mut(routing_key) else {
            return 0;
        };
        let before = entry.bindings.len();
        entry.bindings.retain(|b| !b.matches(queue, arguments));
        let removed = before - entry.bindings.len();
        if entry.bindings.is_empty() {
            keys.remove(routing_key);
        }
        removed
    }

    /// Remove every binding of `queue` regardless of key
    pub fn remove_queue(&self, queue: &QueueRef) -> usize {
        let mut keys = self.keys.write();
        let mut removed = 0;
        keys.retain(|_, entry| {
            let before = entry.bindings.len();
            entry.bindings.retain(|b| b.queue != *queue);
            removed += before - entry.bindings.len();
            !entry.bindings.is_empty()
        });
        removed
    }

    /// Distinct queues bound under exactly `routing_key`
    pub fn lookup(&self, routing_key: &str) -> Vec<QueueRef> {
        let keys = self.keys.read();
        let mut targets = Targets::default();
        if let Some(entry) = keys.get(routing_key) {
            for binding in &entry.bindings {
                targets.push(&binding.queue);
            }
        }
        targets.into_vec()
    }

    /// Distinct queues whose key passes `key_filter` and whose binding passes
    /// `binding_filter`, in binding order
    pub fn matching<K, B>(&self, mut key_filter: K, mut binding_filter: B) -> Vec<QueueRef>
    where
        K: FnMut(&P) -> bool,
        B: FnMut(&Binding) -> bool,
    {
        let keys = self.keys.read();
        let mut targets = Targets::default();
        for entry in keys.values() {
            if !key_filter(&entry.compiled) {
                continue;
            }
            for binding in &entry.bindings {
                if binding_filter(binding) {
                    targets.push(&binding.queue);
                }
            }
        }
        targets.into_vec()
    }

    pub fn bindings(&self) -> Vec<Binding> {
        let keys = self.keys.read();
        let mut all: Vec<Binding> = keys
            .values()
            .flat_map(|entry| entry.bindings.iter().cloned())
            .collect();
        all.sort_by(|a, b| a.routing_key.cmp(&b.routing_key));
        all
    }

    pub fn len(&self) -> usize {
        self.keys.read().values().map(|e| e.bindings.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Release every binding, returning how many were held
    pub fn clear(&self) -> usize {
        let mut keys = self.keys.write();
        let count: usize = keys.values().map(|e| e.bindings.len()).sum();
        keys.clear();
        count
    }
}

/// Ordered set of delivery targets
#[derive(Default)]
struct Targets {
    seen: HashSet<QueueRef>,
    order: Vec<QueueRef>,
}

impl Targets {
    fn push(&mut self, queue: &QueueRef) {
        if self.seen.insert(queue.clone()) {
            self.order.push(queue.clone());
        }
    }

    fn into_vec(self) -> Vec<QueueRef> {
        self.order
    }
}
