//! # Headers Exchange
//!
//! Matches on the message header table instead of the routing key. Binding
//! arguments form the predicate:
//!
//! - `x-match = all` (default): every non-`x-` argument must be present in
//!   the headers with an equal value
//! - `x-match = any`: at least one must
//! - a void argument value checks presence only
//!
//! Arguments whose name starts with `x-` never take part in matching.

use crate::binding::{Binding, BindingTable};
use crate::types::{binding_table_ops, deliver_all, Exchange, ExchangeKind};
use crate::{ExchangeError, ExchangeResult, Message, QueueRef};
use codec::{FieldTable, FieldValue};
use std::sync::Arc;
use tracing::debug;

pub const X_MATCH: &str = "x-match";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl MatchMode {
    pub fn from_arguments(arguments: Option<&FieldTable>) -> ExchangeResult<Self> {
        let Some(value) = arguments.and_then(|args| args.get(X_MATCH)) else {
            return Ok(MatchMode::All);
        };
        match value.as_str() {
            Some("all") => Ok(MatchMode::All),
            Some("any") => Ok(MatchMode::Any),
            _ => Err(ExchangeError::InvalidArgument {
                argument: X_MATCH.to_string(),
                reason: format!("expected \"all\" or \"any\", got {:?}", value),
            }),
        }
    }
}

/// Evaluate binding `arguments` against message `headers`
pub fn headers_match(arguments: Option<&FieldTable>, headers: Option<&FieldTable>) -> bool {
    // bindings are validated on bind, so an unreadable mode here falls back to all
    let mode = MatchMode::from_arguments(arguments).unwrap_or_default();
    let mut predicates = arguments
        .into_iter()
        .flat_map(|args| args.iter())
        .filter(|(name, _)| !name.starts_with("x-"))
        .map(|(name, expected)| {
            let actual = headers.and_then(|h| h.get(name));
            match (expected, actual) {
                (_, None) => false,
                (FieldValue::Void, Some(_)) => true,
                (expected, Some(actual)) => expected == actual,
            }
        });

    match mode {
        MatchMode::All => predicates.all(|hit| hit),
        MatchMode::Any => predicates.any(|hit| hit),
    }
}

#[derive(Debug)]
pub struct HeadersExchange {
    name: String,
    table: BindingTable<()>,
}

impl HeadersExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: BindingTable::new(),
        }
    }
}

impl Exchange for HeadersExchange {
    binding_table_ops!();

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Headers
    }

    fn bind(
        &self,
        queue: QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> ExchangeResult<bool> {
        let mode = MatchMode::from_arguments(arguments)?;
        let name = queue.name().to_string();
        let binding = Binding::new(queue, routing_key).with_arguments(arguments.cloned());
        let added = self.table.insert(binding, |_| ());
        if added {
            debug!(
                "Queue {} bound to headers exchange '{}' (x-match {:?})",
                name, self.name, mode
            );
        }
        Ok(added)
    }

    fn route(
        &self,
        message: &Arc<Message>,
        _routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> usize {
        let headers = arguments.or_else(|| message.headers());
        let targets = self.table.matching(
            |_| true,
            |binding| headers_match(binding.arguments.as_ref(), headers),
        );
        deliver_all(&targets, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryQueue;

    fn table(pairs: &[(&str, FieldValue)]) -> FieldTable {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_all_requires_every_argument() {
        let args = table(&[("format", "pdf".into()), ("type", "report".into())]);
        let full = table(&[("format", "pdf".into()), ("type", "report".into())]);
        let partial = table(&[("format", "pdf".into())]);

        assert!(headers_match(Some(&args), Some(&full)));
        assert!(!headers_match(Some(&args), Some(&partial)));
        assert!(!headers_match(Some(&args), None));
    }

    #[test]
    fn test_any_requires_one_argument() {
        let args = table(&[
            ("x-match", "any".into()),
            ("format", "pdf".into()),
            ("type", "report".into()),
        ]);
        let partial = table(&[("format", "pdf".into())]);
        let wrong = table(&[("format", "zip".into())]);

        assert!(headers_match(Some(&args), Some(&partial)));
        assert!(!headers_match(Some(&args), Some(&wrong)));
    }

    #[test]
    fn test_void_checks_presence() {
        let args = table(&[("trace", FieldValue::Void)]);
        let present = table(&[("trace", 7i32.into())]);
        assert!(headers_match(Some(&args), Some(&present)));
        assert!(!headers_match(Some(&args), Some(&FieldTable::new())));
    }

    #[test]
    fn test_invalid_x_match_rejected_on_bind() {
        let exchange = HeadersExchange::new("amq.match");
        let args = table(&[("x-match", "some".into())]);
        let err = exchange
            .bind(QueueRef::new(InMemoryQueue::new("q")), "", Some(&args))
            .unwrap_err();
        assert_eq!(err.reply_code(), 406);
        assert_eq!(exchange.binding_count(), 0);
    }

    #[test]
    fn test_route_uses_message_headers() {
        let exchange = HeadersExchange::new("amq.match");
        let q = Arc::new(InMemoryQueue::new("q"));
        let args = table(&[("region", "eu".into())]);
        exchange.bind(q.clone().into(), "", Some(&args)).unwrap();

        let properties = codec::BasicProperties {
            headers: Some(table(&[("region", "eu".into())])),
            ..Default::default()
        };
        let msg = Arc::new(Message::new("amq.match", "", &b"x"[..]).with_properties(properties));
        assert_eq!(exchange.route(&msg, "", None), 1);

        let other = Arc::new(Message::new("amq.match", "", &b"x"[..]));
        assert_eq!(exchange.route(&other, "", None), 0);
        assert_eq!(q.len(), 1);
    }
}
