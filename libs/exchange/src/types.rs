//! Exchange contract shared by every exchange kind

use crate::{Binding, ExchangeError, ExchangeResult, Message, QueueRef};
use codec::FieldTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Exchange type as named in `exchange.declare` and in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Topic,
    Fanout,
    Headers,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Headers => "headers",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ExchangeKind::Direct),
            "topic" => Ok(ExchangeKind::Topic),
            "fanout" => Ok(ExchangeKind::Fanout),
            "headers" => Ok(ExchangeKind::Headers),
            other => Err(ExchangeError::UnknownKind(other.to_string())),
        }
    }
}

/// Routing entity matching published messages to bound queues.
///
/// All operations are synchronous and bounded: no I/O happens while the
/// binding table is held. Implementations must deliver to each matched
/// queue at most once per `route` call.
pub trait Exchange: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> ExchangeKind;

    /// Add `(queue, routing_key, arguments)`. Returns `Ok(false)` when the
    /// identical binding already existed.
    fn bind(
        &self,
        queue: QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> ExchangeResult<bool>;

    /// Remove the queue's binding under `routing_key`. `None` arguments
    /// remove it whatever arguments it was bound with. No-op if absent.
    fn unbind(&self, queue: &QueueRef, routing_key: &str, arguments: Option<&FieldTable>)
        -> bool;

    /// Deliver `message` to every distinct matching queue; returns how many.
    /// Zero means unroutable.
    fn route(
        &self,
        message: &Arc<Message>,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> usize;

    /// Remove every binding of `queue`
    fn unbind_queue(&self, queue: &QueueRef) -> usize;

    /// Snapshot of the current bindings, ordered by routing key
    fn bindings(&self) -> Vec<Binding>;

    fn binding_count(&self) -> usize;

    /// Release every binding, returning how many were held
    fn clear(&self) -> usize;
}

/// Hand each target the message after the table lock is gone
pub(crate) fn deliver_all(targets: &[QueueRef], message: &Arc<Message>) -> usize {
    for queue in targets {
        queue.deliver(Arc::clone(message));
    }
    targets.len()
}

/// `Exchange` methods that forward straight to a `table` field
macro_rules! binding_table_ops {
    () => {
        fn name(&self) -> &str {
            &self.name
        }

        fn unbind(
            &self,
            queue: &$crate::QueueRef,
            routing_key: &str,
            arguments: Option<&codec::FieldTable>,
        ) -> bool {
            let removed = self.table.remove(queue, routing_key, arguments);
            if removed > 0 {
                tracing::debug!(
                    "Queue {} unbound from {} exchange '{}' with key '{}'",
                    queue.name(),
                    self.kind(),
                    self.name,
                    routing_key
                );
            }
            removed > 0
        }

        fn unbind_queue(&self, queue: &$crate::QueueRef) -> usize {
            self.table.remove_queue(queue)
        }

        fn bindings(&self) -> Vec<$crate::Binding> {
            self.table.bindings()
        }

        fn binding_count(&self) -> usize {
            self.table.len()
        }

        fn clear(&self) -> usize {
            self.table.clear()
        }
    };
}

pub(crate) use binding_table_ops;
