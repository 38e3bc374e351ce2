//! # Topic Exchange
//!
//! Routing keys and binding patterns are split on `.` into tokens.
//!
//! - a literal token matches only the identical token
//! - `*` matches exactly one token
//! - `#` matches zero or more tokens, anywhere in the pattern
//! - the empty pattern matches only the empty key
//!
//! ```text
//! "abc.#"          matches  abc | abc.def | abc.def.ghi
//! "*.stock.quote"  matches  usd.stock.quote
//!                  rejects  usd.stock.quote.extra | stock.quote
//! "#.b.*"          matches  b.x | a.a.b.x      (any split point for '#')
//! ```
//!
//! Patterns are compiled once per distinct binding key. `route` tokenizes
//! the incoming key once and runs it against every compiled pattern.

use crate::binding::{Binding, BindingTable};
use crate::types::{binding_table_ops, deliver_all, Exchange, ExchangeKind};
use crate::{ExchangeResult, Message, QueueRef};
use codec::FieldTable;
use std::sync::Arc;
use tracing::debug;

pub const TOKEN_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    /// `*`
    One,
    /// `#`
    Any,
}

/// Tokenized binding pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    tokens: Vec<Token>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Self {
        let tokens = tokenize(pattern)
            .into_iter()
            .map(|t| match t {
                "*" => Token::One,
                "#" => Token::Any,
                literal => Token::Literal(literal.to_string()),
            })
            .collect();
        Self { tokens }
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.matches(&tokenize(key))
    }

    /// `reachable[j]` tracks whether the pattern prefix consumed so far can
    /// end exactly after key token `j`.
    pub fn matches(&self, key: &[&str]) -> bool {
        let n = key.len();
        let mut reachable = vec![false; n + 1];
        reachable[0] = true;

        for token in &self.tokens {
            let mut next = vec![false; n + 1];
            match token {
                Token::Any => {
                    let mut seen = false;
                    for j in 0..=n {
                        seen |= reachable[j];
                        next[j] = seen;
                    }
                }
                Token::One => {
                    for j in 0..n {
                        if reachable[j] {
                            next[j + 1] = true;
                        }
                    }
                }
                Token::Literal(literal) => {
                    for j in 0..n {
                        if reachable[j] && key[j] == literal {
                            next[j + 1] = true;
                        }
                    }
                }
            }
            if !next.iter().any(|&r| r) {
                return false;
            }
            reachable = next;
        }
        reachable[n]
    }
}

/// `""` is zero tokens, not one empty token
pub fn tokenize(key: &str) -> Vec<&str> {
    if key.is_empty() {
        Vec::new()
    } else {
        key.split(TOKEN_SEPARATOR).collect()
    }
}

#[derive(Debug)]
pub struct TopicExchange {
    name: String,
    table: BindingTable<TopicPattern>,
}

impl TopicExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: BindingTable::new(),
        }
    }
}

impl Exchange for TopicExchange {
    binding_table_ops!();

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Topic
    }

    fn bind(
        &self,
        queue: QueueRef,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> ExchangeResult<bool> {
        let name = queue.name().to_string();
        let binding = Binding::new(queue, routing_key).with_arguments(arguments.cloned());
        let added = self.table.insert(binding, TopicPattern::parse);
        if added {
            debug!(
                "Queue {} bound to topic exchange '{}' with pattern '{}'",
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
        let key = tokenize(routing_key);
        let targets = self
            .table
            .matching(|pattern| pattern.matches(&key), |_| true);
        deliver_all(&targets, message)
    }
}
