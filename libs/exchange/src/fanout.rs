//! Fanout exchange: every binding matches regardless of routing key

use crate::binding::{Binding, BindingTable};
use crate::types::{binding_table_ops, deliver_all, Exchange, ExchangeKind};
use crate::{ExchangeResult, Message, QueueRef};
use codec::FieldTable;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct FanoutExchange {
    name: String,
    table: BindingTable<()>,
}

impl FanoutExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: BindingTable::new(),
        }
    }
}

impl Exchange for FanoutExchange {
    binding_table_ops!();

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Fanout
    }

    fn bind(
        &self,
        queue: QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> ExchangeResult<bool> {
        let name = queue.name().to_string();
        let binding = Binding::new(queue, routing_key).with_arguments(arguments.cloned());
        let added = self.table.insert(binding, |_| ());
        if added {
            debug!("Queue {} bound to fanout exchange '{}'", name, self.name);
        }
        Ok(added)
    }

    fn route(
        &self,
        message: &Arc<Message>,
        _routing_key: &str,
        _arguments: Option<&FieldTable>,
    ) -> usize {
        let targets = self.table.matching(|_| true, |_| true);
        deliver_all(&targets, message)
    }
}
