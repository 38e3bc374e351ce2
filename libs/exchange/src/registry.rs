//! # Exchange Registry
//!
//! Named exchanges for one broker, constructed once at startup and passed by
//! `Arc` to every connection. This is the management surface a command
//! layer drives: declare, delete, bind, unbind, publish.
//!
//! ## Naming
//!
//! - `""` is the default direct exchange; every declared queue is bound to it
//!   under its own name.
//! - Names starting with `amq.` are reserved. The standard ones are created by
//!   [`ExchangeRegistry::declare_defaults`]; clients may re-declare them with
//!   the matching kind, never create new ones.
//! - Neither the default exchange nor `amq.*` exchanges can be deleted.

use crate::{
    DirectExchange, Exchange, ExchangeError, ExchangeKind, ExchangeResult, FanoutExchange,
    HeadersExchange, Message, QueueRef, TopicExchange,
};
use codec::FieldTable;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_EXCHANGE: &str = "";
pub const RESERVED_PREFIX: &str = "amq.";

/// Standard exchanges every broker starts with
pub const DEFAULT_EXCHANGES: &[(&str, ExchangeKind)] = &[
    (DEFAULT_EXCHANGE, ExchangeKind::Direct),
    ("amq.direct", ExchangeKind::Direct),
    ("amq.topic", ExchangeKind::Topic),
    ("amq.fanout", ExchangeKind::Fanout),
    ("amq.match", ExchangeKind::Headers),
];

pub fn is_reserved(name: &str) -> bool {
    name.is_empty() || name.starts_with(RESERVED_PREFIX)
}

/// Build an empty exchange of `kind`
pub fn new_exchange(name: &str, kind: ExchangeKind) -> Arc<dyn Exchange> {
    match kind {
        ExchangeKind::Direct => Arc::new(DirectExchange::new(name)),
        ExchangeKind::Topic => Arc::new(TopicExchange::new(name)),
        ExchangeKind::Fanout => Arc::new(FanoutExchange::new(name)),
        ExchangeKind::Headers => Arc::new(HeadersExchange::new(name)),
    }
}

#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    exchanges: DashMap<String, Arc<dyn Exchange>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the standard exchanges
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.declare_defaults();
        registry
    }

    pub fn declare_defaults(&self) {
        for (name, kind) in DEFAULT_EXCHANGES {
            if let Err(e) = self.declare_internal(name, *kind) {
                warn!("Standard exchange '{}' not declared: {}", name, e);
            }
        }
    }

    /// Declare `name` as `kind`. Re-declaring with the same kind returns the
    /// existing exchange untouched.
    pub fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
    ) -> ExchangeResult<Arc<dyn Exchange>> {
        if let Some(existing) = self.get(name) {
            return check_kind(existing, kind);
        }
        if is_reserved(name) {
            return Err(ExchangeError::ReservedName(name.to_string()));
        }
        self.declare_internal(name, kind)
    }

    fn declare_internal(
        &self,
        name: &str,
        kind: ExchangeKind,
    ) -> ExchangeResult<Arc<dyn Exchange>> {
        match self.exchanges.entry(name.to_string()) {
            Entry::Occupied(entry) => check_kind(Arc::clone(entry.get()), kind),
            Entry::Vacant(entry) => {
                let exchange = new_exchange(name, kind);
                entry.insert(Arc::clone(&exchange));
                info!("Declared {} exchange '{}'", kind, name);
                Ok(exchange)
            }
        }
    }

    /// Remove `name` and release all of its bindings. With `if_unused`, an
    /// exchange that still has bindings is left alone.
    pub fn delete_exchange(&self, name: &str, if_unused: bool) -> ExchangeResult<()> {
        if is_reserved(name) {
            return Err(ExchangeError::ReservedName(name.to_string()));
        }

        // the entry guard excludes `bind` until the exchange is out of the map
        let Entry::Occupied(entry) = self.exchanges.entry(name.to_string()) else {
            return Err(ExchangeError::NotFound(name.to_string()));
        };
        if if_unused {
            let bindings = entry.get().binding_count();
            if bindings > 0 {
                return Err(ExchangeError::InUse {
                    name: name.to_string(),
                    bindings,
                });
            }
        }
        let (_, exchange) = entry.remove_entry();

        let released = exchange.clear();
        info!(
            "Deleted {} exchange '{}' ({} bindings released)",
            exchange.kind(),
            name,
            released
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Exchange>> {
        self.exchanges.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exchanges.contains_key(name)
    }

    fn require(&self, name: &str) -> ExchangeResult<Arc<dyn Exchange>> {
        self.get(name).ok_or_else(|| ExchangeError::NotFound(name.to_string()))
    }

    pub fn bind(
        &self,
        exchange: &str,
        queue: QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> ExchangeResult<bool> {
        // map guard held across the bind so a concurrent delete sees it
        let target = self
            .exchanges
            .get(exchange)
            .ok_or_else(|| ExchangeError::NotFound(exchange.to_string()))?;
        target.bind(queue, routing_key, arguments)
    }

    pub fn unbind(
        &self,
        exchange: &str,
        queue: &QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> ExchangeResult<bool> {
        Ok(self.require(exchange)?.unbind(queue, routing_key, arguments))
    }

    /// Route `message` through `exchange`; returns the number of queues that
    /// received it. The registry map is not held while delivering.
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        arguments: Option<&FieldTable>,
        message: Arc<Message>,
    ) -> ExchangeResult<usize> {
        let target = self.require(exchange)?;
        let matched = target.route(&message, routing_key, arguments);
        if matched == 0 {
            debug!(
                "Unroutable message on exchange '{}' with key '{}'",
                exchange, routing_key
            );
        }
        Ok(matched)
    }

    /// Exchange names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.exchanges.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Drop every binding of `queue` on every exchange (queue deletion)
    pub fn unbind_queue_everywhere(&self, queue: &QueueRef) -> usize {
        let exchanges: Vec<Arc<dyn Exchange>> =
            self.exchanges.iter().map(|e| Arc::clone(e.value())).collect();
        let removed: usize = exchanges.iter().map(|e| e.unbind_queue(queue)).sum();
        debug!("Queue {} unbound from {} bindings", queue.name(), removed);
        removed
    }
}

fn check_kind(
    existing: Arc<dyn Exchange>,
    requested: ExchangeKind,
) -> ExchangeResult<Arc<dyn Exchange>> {
    if existing.kind() == requested {
        Ok(existing)
    } else {
        Err(ExchangeError::AlreadyDeclared {
            name: existing.name().to_string(),
            existing: existing.kind(),
            requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryQueue;

    #[test]
    fn test_defaults_present() {
        let registry = ExchangeRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["", "amq.direct", "amq.fanout", "amq.match", "amq.topic"]
        );
        assert_eq!(registry.get("amq.match").unwrap().kind(), ExchangeKind::Headers);
    }

    #[test]
    fn test_redeclare_same_kind_is_idempotent() {
        let registry = ExchangeRegistry::new();
        let first = registry.declare_exchange("market", ExchangeKind::Topic).unwrap();
        let second = registry.declare_exchange("market", ExchangeKind::Topic).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let err = registry
            .declare_exchange("market", ExchangeKind::Direct)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::AlreadyDeclared { .. }));
    }

    #[test]
    fn test_reserved_names() {
        let registry = ExchangeRegistry::with_defaults();
        assert!(registry.declare_exchange("amq.topic", ExchangeKind::Topic).is_ok());
        assert_eq!(
            registry.declare_exchange("amq.custom", ExchangeKind::Topic).unwrap_err(),
            ExchangeError::ReservedName("amq.custom".into())
        );
        assert!(registry.delete_exchange("amq.direct", false).is_err());
        assert!(registry.delete_exchange("", false).is_err());
    }

    #[test]
    fn test_delete_releases_bindings() {
        let registry = ExchangeRegistry::new();
        registry.declare_exchange("d", ExchangeKind::Direct).unwrap();
        let q = QueueRef::new(InMemoryQueue::new("q"));
        registry.bind("d", q.clone(), "k", None).unwrap();

        assert!(matches!(
            registry.delete_exchange("d", true),
            Err(ExchangeError::InUse { bindings: 1, .. })
        ));
        registry.delete_exchange("d", false).unwrap();
        assert!(!registry.contains("d"));
        assert_eq!(
            registry.bind("d", q, "k", None).unwrap_err(),
            ExchangeError::NotFound("d".into())
        );
    }

    #[test]
    fn test_publish_unknown_exchange() {
        let registry = ExchangeRegistry::new();
        let msg = Arc::new(Message::new("nope", "k", &b"x"[..]));
        assert_eq!(
            registry.publish("nope", "k", None, msg).unwrap_err().reply_code(),
            404
        );
    }

    #[test]
    fn test_unbind_queue_everywhere() {
        let registry = ExchangeRegistry::with_defaults();
        let q = QueueRef::new(InMemoryQueue::new("q"));
        registry.bind("", q.clone(), "q", None).unwrap();
        registry.bind("amq.topic", q.clone(), "a.#", None).unwrap();
        registry.bind("amq.fanout", q.clone(), "", None).unwrap();

        assert_eq!(registry.unbind_queue_everywhere(&q), 3);
        let msg = Arc::new(Message::new("amq.fanout", "", &b"x"[..]));
        assert_eq!(registry.publish("amq.fanout", "", None, msg).unwrap(), 0);
    }
}
