//! # Method Registry - Version-Keyed Method Body Constructors
//!
//! ## Purpose
//!
//! Resolves a `(class_id, method_id)` pair read from a method frame into a
//! typed [`MethodBody`] for a given protocol version. The table for each
//! version is built once when the registry is constructed; the registry is
//! then shared (typically behind an `Arc`) by every connection's frame codec.
//! There is no global registration list.
//!
//! ```text
//! (40, 10, 8-0) → ExchangeDeclare::decode_fields
//! (50, 20, 8-0) → QueueBind::decode_fields
//! (60, 40, 8-0) → BasicPublish::decode_fields
//! ```
//!
//! Lookups that miss are framing errors: the peer sent a command this
//! protocol version does not define.

use crate::body::method::{self, decode_method, Method, MethodBody};
use crate::buffer::ByteCursor;
use crate::constants::ProtocolVersion;
use crate::error::{ProtocolError, ProtocolResult};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Constructor decoding the arguments of one method
pub type MethodDecoder = fn(&mut ByteCursor) -> ProtocolResult<MethodBody>;

/// Method table for a single protocol version
#[derive(Debug, Default, Clone)]
pub struct MethodTable {
    decoders: HashMap<(u16, u16), MethodDecoder>,
    classes: HashSet<u16>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M` under its class and method id
    pub fn register<M>(&mut self) -> &mut Self
    where
        M: Method + Into<MethodBody>,
    {
        self.decoders
            .insert((M::CLASS_ID, M::METHOD_ID), decode_method::<M>);
        self.classes.insert(M::CLASS_ID);
        self
    }

    pub fn get(&self, class_id: u16, method_id: u16) -> Option<MethodDecoder> {
        self.decoders.get(&(class_id, method_id)).copied()
    }

    pub fn has_class(&self, class_id: u16) -> bool {
        self.classes.contains(&class_id)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Methods defined by AMQP 8-0 that this broker core understands
    pub fn amqp_8_0() -> Self {
        let mut table = Self::new();
        table
            .register::<method::ConnectionClose>()
            .register::<method::ConnectionCloseOk>()
            .register::<method::ChannelOpen>()
            .register::<method::ChannelOpenOk>()
            .register::<method::ChannelClose>()
            .register::<method::ChannelCloseOk>()
            .register::<method::ExchangeDeclare>()
            .register::<method::ExchangeDeclareOk>()
            .register::<method::ExchangeDelete>()
            .register::<method::ExchangeDeleteOk>()
            .register::<method::QueueDeclare>()
            .register::<method::QueueDeclareOk>()
            .register::<method::QueueBind>()
            .register::<method::QueueBindOk>()
            .register::<method::QueueUnbind>()
            .register::<method::QueueUnbindOk>()
            .register::<method::BasicPublish>()
            .register::<method::BasicReturn>()
            .register::<method::BasicDeliver>();
        table
    }
}

/// Registry of method tables keyed by protocol version
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    tables: HashMap<ProtocolVersion, MethodTable>,
}

impl MethodRegistry {
    /// Registry with every supported protocol version installed
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.install(ProtocolVersion::V8_0, MethodTable::amqp_8_0());
        registry
    }

    pub fn empty() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Install or replace the table for a version
    pub fn install(&mut self, version: ProtocolVersion, table: MethodTable) {
        debug!("Installed {} methods for protocol version {}", table.len(), version);
        self.tables.insert(version, table);
    }

    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.tables.contains_key(&version)
    }

    /// Find the constructor for a class/method pair
    pub fn resolve(
        &self,
        class_id: u16,
        method_id: u16,
        version: ProtocolVersion,
    ) -> ProtocolResult<MethodDecoder> {
        let table = self
            .tables
            .get(&version)
            .ok_or_else(|| ProtocolError::UnsupportedVersion {
                version,
                supported: self.supported_versions(),
            })?;

        if let Some(decoder) = table.get(class_id, method_id) {
            return Ok(decoder);
        }

        if table.has_class(class_id) {
            Err(ProtocolError::UnknownMethod {
                class_id,
                method_id,
                version,
            })
        } else {
            Err(ProtocolError::UnknownClass {
                class_id,
                method_id,
                version,
            })
        }
    }

    /// Resolve and decode the method arguments that follow the ids
    pub fn decode(
        &self,
        class_id: u16,
        method_id: u16,
        version: ProtocolVersion,
        cursor: &mut ByteCursor,
    ) -> ProtocolResult<MethodBody> {
        let decoder = self.resolve(class_id, method_id, version)?;
        decoder(cursor)
    }

    fn supported_versions(&self) -> String {
        let mut versions: Vec<_> = self.tables.keys().copied().collect();
        versions.sort();
        versions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
