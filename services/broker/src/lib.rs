//! # Burrow Broker
//!
//! Wires the wire codec and the routing core into a running broker:
//!
//! - [`BrokerConfig`]: TOML configuration
//! - [`Dispatcher`]: per-connection command processing
//! - [`serve_connection`]: byte stream ↔ frames loop
//! - [`Broker`]: shared registries and the TCP accept loop
//!
//! ```text
//! TcpStream → serve_connection → FrameCodec::decode → Dispatcher
//!                                                         ↓
//!                                   ExchangeRegistry / QueueTable
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod queues;
pub mod server;

pub use config::{BrokerConfig, ExchangeDeclaration};
pub use connection::serve_connection;
pub use dispatch::{Dispatcher, Flow};
pub use error::{BrokerError, BrokerResult};
pub use queues::QueueTable;
pub use server::Broker;
