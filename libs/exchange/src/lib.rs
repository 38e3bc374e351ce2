//! # Burrow Routing Core
//!
//! ## Purpose
//!
//! Exchanges, bindings and the registry that owns them. A published message
//! enters through [`ExchangeRegistry::publish`], is matched against the
//! target exchange's binding table, and is handed to every distinct matching
//! queue exactly once.
//!
//! ## Architecture Role
//!
//! ```text
//! basic.publish → [ExchangeRegistry] → Arc<dyn Exchange> → BindingTable
//!                                                              ↓ read lock: collect targets
//!                                                          QueueRef::deliver (lock released)
//! ```
//!
//! ## Exchange Kinds
//!
//! | kind    | matches when                                   |
//! |---------|------------------------------------------------|
//! | direct  | binding key == routing key                     |
//! | topic   | binding pattern (`*`, `#`) matches routing key |
//! | fanout  | always                                         |
//! | headers | binding arguments match message headers        |
//!
//! ## Queue Lifetime
//!
//! Bindings hold a [`QueueRef`] (shared ownership). A queue bound and then
//! dropped by its creator keeps receiving messages until it is unbound.

pub mod binding;
pub mod direct;
pub mod error;
pub mod fanout;
pub mod headers;
pub mod message;
pub mod queue;
pub mod registry;
pub mod topic;
pub mod types;

pub use binding::{Binding, BindingTable};
pub use direct::DirectExchange;
pub use error::{ExchangeError, ExchangeResult};
pub use fanout::FanoutExchange;
pub use headers::{headers_match, HeadersExchange, MatchMode};
pub use message::Message;
pub use queue::{InMemoryQueue, Queue, QueueRef};
pub use registry::{ExchangeRegistry, DEFAULT_EXCHANGE, DEFAULT_EXCHANGES};
pub use topic::{TopicExchange, TopicPattern};
pub use types::{Exchange, ExchangeKind};
