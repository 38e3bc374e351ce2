//! Published message as seen by the routing core

use bytes::Bytes;
use codec::{BasicProperties, FieldTable};

/// A message handed to `route`. The payload is opaque; only the routing key
/// (and, for headers exchanges, the header table) drive binding selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Exchange the message was published to
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub payload: Bytes,
}

impl Message {
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            properties: BasicProperties::default(),
            payload: payload.into(),
        }
    }

    pub fn with_properties(mut self, properties: BasicProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Header table from the content properties, if any
    pub fn headers(&self) -> Option<&FieldTable> {
        self.properties.headers.as_ref()
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
