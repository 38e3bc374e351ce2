//! Direct exchange: a binding matches iff its key is byte-equal to the
//! routing key

use crate::binding::{Binding, BindingTable};
use crate::types::{binding_table_ops, deliver_all, Exchange, ExchangeKind};
use crate::{ExchangeResult, Message, QueueRef};
use codec::FieldTable;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct DirectExchange {
    name: String,
    table: BindingTable<()>,
}

impl DirectExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: BindingTable::new(),
        }
    }
}

impl Exchange for DirectExchange {
    binding_table_ops!();

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Direct
    }

    fn bind(
        &self,
        queue: QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> ExchangeResult<bool> {
        let binding = Binding::new(queue, routing_key).with_arguments(arguments.cloned());
        let name = binding.queue.name().to_string();
        let added = self.table.insert(binding, |_| ());
        if added {
            debug!(
                "Queue {} bound to direct exchange '{}' with key '{}'",
                name, self.name, routing_key
            );
        }
        Ok(added)
    }

    fn route(
        &self,
        message: &Arc<Message>,
        routing_key: &str,
        _arguments: Option<&FieldTable>,
    ) -> usize {
        let targets = self.table.lookup(routing_key);
        deliver_all(&targets, message)
    }
}
